use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Body of `GET /indicadores/tc`. Only the dollar quotes are decoded.
#[derive(Debug, Deserialize, PartialEq)]
pub struct TipoCambio {
    #[serde(rename = "dolar")]
    pub dollar: DollarQuotes,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct DollarQuotes {
    #[serde(rename = "compra")]
    pub buy: Quote,
    #[serde(rename = "venta")]
    pub sell: Quote,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct Quote {
    #[serde(rename = "valor")]
    pub value: QuoteValue,
    #[serde(rename = "fecha", default)]
    pub date: Option<String>,
}

/// The API has served `valor` both as a JSON number and as a numeric string.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QuoteValue {
    Number(serde_json::Number),
    Text(String),
}

impl QuoteValue {
    pub fn to_decimal(&self) -> Result<Decimal, rust_decimal::Error> {
        match self {
            QuoteValue::Number(n) => {
                // serde_json prints large or tiny floats in exponent form.
                let text = n.to_string();
                Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text))
            }
            QuoteValue::Text(s) => Decimal::from_str(&normalize_decimal_string(s.trim())),
        }
    }
}

fn normalize_decimal_string(s: &str) -> String {
    s.replace(',', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_numeric_values() {
        let body = r#"{
            "dolar": {
                "venta": {"fecha": "2024-03-15 00:00:00", "valor": 528.75},
                "compra": {"fecha": "2024-03-15 00:00:00", "valor": 520.5}
            },
            "euro": {"fecha": "2024-03-15 00:00:00", "dolares": 1.09, "colones": 575.1}
        }"#;
        let tc: TipoCambio = serde_json::from_str(body).unwrap();

        assert_eq!(tc.dollar.buy.value.to_decimal().unwrap(), Decimal::from_str("520.50").unwrap());
        assert_eq!(tc.dollar.sell.value.to_decimal().unwrap(), Decimal::from_str("528.75").unwrap());
        assert_eq!(tc.dollar.buy.date.as_deref(), Some("2024-03-15 00:00:00"));
    }

    #[test]
    fn decodes_string_values() {
        let body = r#"{"dolar":{"compra":{"valor":"520.50"},"venta":{"valor":"528,75"}}}"#;
        let tc: TipoCambio = serde_json::from_str(body).unwrap();

        assert_eq!(tc.dollar.buy.value.to_decimal().unwrap(), Decimal::from_str("520.50").unwrap());
        assert_eq!(tc.dollar.sell.value.to_decimal().unwrap(), Decimal::from_str("528.75").unwrap());
        assert!(tc.dollar.buy.date.is_none());
    }

    #[test]
    fn rejects_null_value() {
        let body = r#"{"dolar":{"compra":{"valor":null},"venta":{"valor":528.75}}}"#;
        assert!(serde_json::from_str::<TipoCambio>(body).is_err());
    }

    #[test]
    fn decodes_exponent_numbers() {
        let tc: TipoCambio =
            serde_json::from_str(r#"{"dolar":{"compra":{"valor":1e16},"venta":{"valor":5.2e2}}}"#)
                .unwrap();

        assert_eq!(
            tc.dollar.buy.value.to_decimal().unwrap(),
            Decimal::from(10_000_000_000_000_000_i64)
        );
        assert_eq!(tc.dollar.sell.value.to_decimal().unwrap(), Decimal::from(520));

        let tiny = QuoteValue::Number(serde_json::Number::from_f64(1.5e-7).unwrap());
        assert_eq!(tiny.to_decimal().unwrap(), Decimal::from_str("0.00000015").unwrap());
    }

    #[test]
    fn text_value_must_be_numeric() {
        let value = QuoteValue::Text("n/a".to_string());
        assert!(value.to_decimal().is_err());
    }
}
