//! Plain-text receipt for a recorded transaction.

use bigdecimal::BigDecimal;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

use crate::domain::Transaction;

/// Decimal places shown for an amount in `currency`.
fn places(currency: &str) -> i64 {
    match currency.to_ascii_uppercase().as_str() {
        "BTC" | "ETH" => 8,
        _ => 2,
    }
}

pub fn format_amount(value: &BigDecimal, currency: &str) -> String {
    let scale = places(currency);
    format!("{} {}", value.round(scale).with_scale(scale), currency.to_ascii_uppercase())
}

fn format_timestamp(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => millis.to_string(),
    }
}

/// Renders the downloadable receipt. Fee lines are always in USD.
pub fn render(
    transaction: &Transaction,
    property_address: Option<&str>,
    generated_at: DateTime<Utc>,
) -> String {
    Receipt {
        transaction,
        property_address,
        generated_at,
    }
    .to_string()
}

struct Receipt<'a> {
    transaction: &'a Transaction,
    property_address: Option<&'a str>,
    generated_at: DateTime<Utc>,
}

impl fmt::Display for Receipt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tx = self.transaction;
        let fees = &tx.fees;
        let total = &tx.amount + &fees.total_fee;

        writeln!(f, "PAYMENT RECEIPT")?;
        writeln!(f, "Transaction ID: {}", tx.id)?;
        writeln!(f, "Date: {}", format_timestamp(tx.timestamp))?;
        writeln!(f)?;

        if let Some(title) = &tx.property_title {
            writeln!(f, "Property: {}", title)?;
        }
        if let Some(address) = self.property_address {
            writeln!(f, "Address: {}", address)?;
        }
        if tx.property_title.is_some() || self.property_address.is_some() {
            writeln!(f)?;
        }

        writeln!(f, "PAYMENT DETAILS")?;
        writeln!(f, "Amount: {}", format_amount(&tx.amount, &tx.currency))?;
        if let (Some(amount), Some(symbol)) = (&tx.crypto_amount, &tx.crypto_symbol) {
            writeln!(f, "Crypto Amount: {} {}", amount, symbol)?;
        }
        writeln!(f, "Payment Method: {}", tx.payment_method)?;
        writeln!(f, "Status: {}", tx.status)?;
        writeln!(f)?;

        writeln!(f, "TRANSACTION DETAILS")?;
        writeln!(f, "Hash: {}", tx.hash)?;
        writeln!(f, "Sender: {}", tx.sender)?;
        writeln!(f, "Recipient: {}", tx.recipient)?;
        writeln!(f)?;

        writeln!(f, "FEES")?;
        writeln!(f, "Processor Fee: {}", format_amount(&fees.processor_fee, "USD"))?;
        writeln!(f, "Network Fee: {}", format_amount(&fees.network_fee, "USD"))?;
        writeln!(f, "Platform Fee: {}", format_amount(&fees.platform_fee, "USD"))?;
        writeln!(f, "Total Fee: {}", format_amount(&fees.total_fee, "USD"))?;
        writeln!(f)?;

        writeln!(f, "TOTAL AMOUNT: {}", format_amount(&total, "USD"))?;
        writeln!(f)?;
        writeln!(
            f,
            "This receipt was generated on {}.",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(f, "Thank you for your business!")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fees, NewTransaction, PaymentMethod, PropertyRef};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn card_transaction() -> Transaction {
        let mut tx = Transaction::new(NewTransaction {
            hash: "card-abc".to_string(),
            amount: dec("1000"),
            currency: "USD".to_string(),
            payment_method: PaymentMethod::Card,
            recipient: "0x1234567890123456789012345678901234567890".to_string(),
            sender: "buyer-1".to_string(),
            fees: Fees {
                processor_fee: dec("29.000"),
                network_fee: dec("0.30"),
                platform_fee: dec("10.00"),
                total_fee: dec("39.300"),
            },
            property: Some(PropertyRef {
                id: "prop-1".to_string(),
                title: "Harbor Loft".to_string(),
            }),
            crypto_amount: None,
            crypto_symbol: None,
            metadata: serde_json::Map::new(),
        })
        .with_id("tx-1");
        tx.timestamp = 1_700_000_000_000;
        tx
    }

    #[test]
    fn test_receipt_totals_amount_and_fees() {
        let text = render(&card_transaction(), Some("1 Pier Rd"), Utc::now());

        assert!(text.starts_with("PAYMENT RECEIPT\n"));
        assert!(text.contains("Transaction ID: tx-1"));
        assert!(text.contains("Date: 2023-11-14 22:13:20 UTC"));
        assert!(text.contains("Property: Harbor Loft"));
        assert!(text.contains("Address: 1 Pier Rd"));
        assert!(text.contains("Processor Fee: 29.00 USD"));
        assert!(text.contains("Total Fee: 39.30 USD"));
        assert!(text.contains("TOTAL AMOUNT: 1039.30 USD"));
        assert!(text.contains("Payment Method: card"));
        assert!(text.contains("Status: pending"));
    }

    #[test]
    fn test_receipt_sections_in_order() {
        let generated_at = Utc.timestamp_millis_opt(1_700_000_060_000).unwrap();
        let text = render(&card_transaction(), None, generated_at);

        let headings: Vec<&str> = text
            .lines()
            .filter(|line| {
                matches!(
                    *line,
                    "PAYMENT RECEIPT" | "PAYMENT DETAILS" | "TRANSACTION DETAILS" | "FEES"
                )
            })
            .collect();
        assert_eq!(
            headings,
            vec!["PAYMENT RECEIPT", "PAYMENT DETAILS", "TRANSACTION DETAILS", "FEES"]
        );
        assert!(!text.contains("Address:"));
        assert!(text.contains("This receipt was generated on 2023-11-14 22:14:20 UTC."));
        assert!(text.ends_with("Thank you for your business!\n"));
    }

    #[test]
    fn test_crypto_amounts_keep_eight_places() {
        assert_eq!(format_amount(&dec("3.846153846"), "btc"), "3.84615385 BTC");
        assert_eq!(format_amount(&dec("12.5"), "USD"), "12.50 USD");
    }
}
