//! Weighted-random status oracle.
//!
//! Outcomes do not reflect the submitted transfer: 10% failed, 20% pending, 20% processing,
//! 50% confirmed with 1..=10 confirmations. Replace with a real settlement check when one exists.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use crate::domain::TransactionStatus;
use crate::error::OracleError;
use crate::ports::{StatusOracle, StatusSnapshot};

pub struct SimulatedOracle {
    latency: Duration,
}

impl SimulatedOracle {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

/// Maps a roll in `[0, 1)` onto the weighted outcome table.
pub fn classify(roll: f64, confirmations: u32) -> StatusSnapshot {
    let status = if roll < 0.1 {
        TransactionStatus::Failed
    } else if roll < 0.3 {
        TransactionStatus::Pending
    } else if roll < 0.5 {
        TransactionStatus::Processing
    } else {
        TransactionStatus::Confirmed
    };

    StatusSnapshot {
        status,
        confirmations: if status == TransactionStatus::Confirmed {
            confirmations
        } else {
            0
        },
    }
}

#[async_trait]
impl StatusOracle for SimulatedOracle {
    async fn check_status(&self, reference: &str) -> Result<StatusSnapshot, OracleError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let (roll, confirmations) = {
            let mut rng = rand::rng();
            (rng.random::<f64>(), rng.random_range(1..=10u32))
        };
        let snapshot = classify(roll, confirmations);
        tracing::debug!(reference, status = %snapshot.status, "simulated status check");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_boundaries() {
        assert_eq!(classify(0.0, 5).status, TransactionStatus::Failed);
        assert_eq!(classify(0.1, 5).status, TransactionStatus::Pending);
        assert_eq!(classify(0.3, 5).status, TransactionStatus::Processing);
        assert_eq!(classify(0.5, 5).status, TransactionStatus::Confirmed);
        assert_eq!(classify(0.99, 5).confirmations, 5);
    }

    #[test]
    fn test_confirmations_only_when_confirmed() {
        assert_eq!(classify(0.2, 7).confirmations, 0);
        assert_eq!(classify(0.05, 7).confirmations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_status_returns_snapshot() {
        let oracle = SimulatedOracle::new(Duration::from_millis(1000));
        let snapshot = oracle.check_status("0xabc").await.unwrap();
        assert!(snapshot.confirmations <= 10);
    }
}
