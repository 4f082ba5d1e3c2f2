//! Fee policy: a pure mapping from (amount, method, coin) to a fee breakdown.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Fees, PaymentMethod};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub processor_fee: BigDecimal,
    pub network_fee: BigDecimal,
    pub platform_fee: BigDecimal,
    pub total_fee: BigDecimal,
    pub final_amount: BigDecimal,
}

impl FeeBreakdown {
    /// Components persisted on the transaction record.
    pub fn fees(&self) -> Fees {
        Fees {
            processor_fee: self.processor_fee.clone(),
            network_fee: self.network_fee.clone(),
            platform_fee: self.platform_fee.clone(),
            total_fee: self.total_fee.clone(),
        }
    }
}

struct FeeSchedule {
    processor_rate: BigDecimal,
    network_fixed: BigDecimal,
    platform_rate: BigDecimal,
}

fn decimal(digits: i64, scale: i64) -> BigDecimal {
    BigDecimal::new(digits.into(), scale)
}

fn schedule(method: Option<PaymentMethod>, crypto: Option<&str>) -> FeeSchedule {
    match method {
        Some(PaymentMethod::Card) => FeeSchedule {
            processor_rate: decimal(29, 3),
            network_fixed: decimal(30, 2),
            platform_rate: decimal(1, 2),
        },
        Some(PaymentMethod::Bank) => FeeSchedule {
            processor_rate: decimal(5, 3),
            network_fixed: decimal(0, 0),
            platform_rate: decimal(1, 2),
        },
        Some(PaymentMethod::Crypto) => FeeSchedule {
            processor_rate: decimal(0, 0),
            network_fixed: network_estimate(crypto),
            platform_rate: decimal(5, 3),
        },
        None => FeeSchedule {
            processor_rate: decimal(0, 0),
            network_fixed: decimal(0, 0),
            platform_rate: decimal(1, 2),
        },
    }
}

/// Fixed network fee estimate in USD for a coin id.
pub fn network_estimate(crypto: Option<&str>) -> BigDecimal {
    match crypto {
        Some("ethereum") => decimal(10, 0),
        Some("bitcoin") => decimal(2, 0),
        _ => decimal(1, 0),
    }
}

fn apply(amount: &BigDecimal, schedule: FeeSchedule) -> Option<FeeBreakdown> {
    if *amount <= BigDecimal::from(0) {
        return None;
    }

    let processor_fee = amount * &schedule.processor_rate;
    let platform_fee = amount * &schedule.platform_rate;
    let network_fee = schedule.network_fixed;
    let total_fee = &processor_fee + &network_fee + &platform_fee;
    let final_amount = amount + &total_fee;

    Some(FeeBreakdown {
        processor_fee,
        network_fee,
        platform_fee,
        total_fee,
        final_amount,
    })
}

/// Returns `None` for a zero or negative amount.
pub fn calculate_fees(
    amount: &BigDecimal,
    method: PaymentMethod,
    crypto: Option<&str>,
) -> Option<FeeBreakdown> {
    apply(amount, schedule(Some(method), crypto))
}

/// Like [`calculate_fees`], but an unrecognized method name gets the default schedule
/// (no processor or network fee, 1% platform fee).
pub fn calculate_fees_by_name(
    amount: &BigDecimal,
    method: &str,
    crypto: Option<&str>,
) -> Option<FeeBreakdown> {
    apply(amount, schedule(method.parse().ok(), crypto))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_card_fees_for_1000() {
        let fees = calculate_fees(&dec("1000"), PaymentMethod::Card, None).unwrap();
        assert_eq!(fees.processor_fee, dec("29.00"));
        assert_eq!(fees.network_fee, dec("0.30"));
        assert_eq!(fees.platform_fee, dec("10.00"));
        assert_eq!(fees.total_fee, dec("39.30"));
        assert_eq!(fees.final_amount, dec("1039.30"));
    }

    #[test]
    fn test_bank_fees() {
        let fees = calculate_fees(&dec("2000"), PaymentMethod::Bank, None).unwrap();
        assert_eq!(fees.processor_fee, dec("10"));
        assert_eq!(fees.network_fee, dec("0"));
        assert_eq!(fees.platform_fee, dec("20"));
        assert_eq!(fees.final_amount, dec("2030"));
    }

    #[test]
    fn test_crypto_network_estimates() {
        let cases = [
            (Some("ethereum"), "10"),
            (Some("bitcoin"), "2"),
            (Some("tether"), "1"),
            (None, "1"),
        ];
        for (coin, expected) in cases {
            let fees = calculate_fees(&dec("100"), PaymentMethod::Crypto, coin).unwrap();
            assert_eq!(fees.network_fee, dec(expected), "coin {:?}", coin);
            assert_eq!(fees.processor_fee, dec("0"));
            assert_eq!(fees.platform_fee, dec("0.5"));
        }
    }

    #[test]
    fn test_bitcoin_offer_of_250000() {
        let fees = calculate_fees(&dec("250000"), PaymentMethod::Crypto, Some("bitcoin")).unwrap();
        assert_eq!(fees.network_fee, dec("2"));
        assert_eq!(fees.platform_fee, dec("1250"));
        assert_eq!(fees.total_fee, dec("1252"));
        assert_eq!(fees.final_amount, dec("251252"));
    }

    #[test]
    fn test_unknown_method_uses_default_schedule() {
        let fees = calculate_fees_by_name(&dec("500"), "wire", None).unwrap();
        assert_eq!(fees.processor_fee, dec("0"));
        assert_eq!(fees.network_fee, dec("0"));
        assert_eq!(fees.platform_fee, dec("5"));
        assert_eq!(fees.total_fee, dec("5"));
    }

    #[test]
    fn test_non_positive_amount_yields_none() {
        assert!(calculate_fees(&dec("0"), PaymentMethod::Card, None).is_none());
        assert!(calculate_fees(&dec("-10"), PaymentMethod::Bank, None).is_none());
    }

    #[test]
    fn test_totals_are_exact_sums() {
        for amount in ["0.01", "19.99", "123456.78", "999999999.99"] {
            for method in [PaymentMethod::Card, PaymentMethod::Bank, PaymentMethod::Crypto] {
                let amount = dec(amount);
                let fees = calculate_fees(&amount, method, Some("ethereum")).unwrap();
                assert_eq!(
                    fees.total_fee,
                    &fees.processor_fee + &fees.network_fee + &fees.platform_fee
                );
                assert_eq!(fees.final_amount, &amount + &fees.total_fee);
            }
        }
    }
}
