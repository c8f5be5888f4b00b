//! The single decimal-safe parse point for monetary values.
//!
//! Amounts arrive from `row_to_json` either as JSON numbers (Postgres
//! `numeric`) or as strings. Both paths go through [`parse_decimal`]; a
//! value that cannot be read as a decimal contributes zero to its rollup
//! rather than failing the batch.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn parse_decimal(value: &Value) -> Decimal {
    match value {
        // serde_json's arbitrary_precision keeps the source digits intact,
        // so numeric columns round-trip without float loss.
        Value::Number(number) => decimal_from_text(&number.to_string()),
        Value::String(text) => decimal_from_text(text),
        _ => Decimal::ZERO,
    }
}

/// serde adapter for record fields: missing, null, or malformed → zero.
pub fn decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_decimal(&value))
}

fn decimal_from_text(text: &str) -> Decimal {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::parse_decimal;

    #[test]
    fn reads_strings_and_numbers() {
        assert_eq!(parse_decimal(&json!("542.30")), dec!(542.30));
        assert_eq!(parse_decimal(&json!(" 80 ")), dec!(80));
        assert_eq!(parse_decimal(&json!(120.45)), dec!(120.45));
        assert_eq!(parse_decimal(&json!(-15)), dec!(-15));
    }

    #[test]
    fn keeps_source_precision_from_json_numbers() {
        let row: serde_json::Value = serde_json::from_str(r#"{"amount": 1234567.89}"#).unwrap();
        assert_eq!(parse_decimal(&row["amount"]), dec!(1234567.89));
    }

    #[test]
    fn malformed_values_read_as_zero() {
        assert_eq!(parse_decimal(&json!("not-a-number")), dec!(0));
        assert_eq!(parse_decimal(&json!("")), dec!(0));
        assert_eq!(parse_decimal(&json!(null)), dec!(0));
        assert_eq!(parse_decimal(&json!({"nested": true})), dec!(0));
    }

    #[test]
    fn accepts_scientific_notation() {
        assert_eq!(parse_decimal(&json!("1.2e3")), dec!(1200));
    }
}
