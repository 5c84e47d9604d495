//! Order Translator
//!
//! Turns a decoded webhook payload into an [`OrderRequest`]. Pure: no I/O,
//! no clocks, no broker knowledge beyond the field rules.
//!
//! # Field Rules
//!
//! | Field | Rule |
//! |-------|------|
//! | `symbolId` | JSON integer, `> 0` |
//! | `tradeSide` | string, `BUY` or `SELL` in any letter case |
//! | `volume` | JSON number, `> 0` |
//!
//! Fields are checked in that order and the first failure is reported.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::order::{OrderRequest, TradeSide};

/// Raw webhook body as sent by the alerting platform.
///
/// Every field is kept as an untyped JSON value so the translator can
/// report missing and mistyped fields by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Broker symbol id.
    #[serde(default)]
    pub symbol_id: Option<Value>,
    /// `BUY` or `SELL`.
    #[serde(default)]
    pub trade_side: Option<Value>,
    /// Order volume in lots.
    #[serde(default)]
    pub volume: Option<Value>,
}

/// Webhook fields subject to validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    /// `symbolId`
    SymbolId,
    /// `tradeSide`
    TradeSide,
    /// `volume`
    Volume,
}

impl PayloadField {
    /// Field name as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SymbolId => "symbolId",
            Self::TradeSide => "tradeSide",
            Self::Volume => "volume",
        }
    }
}

/// A client-fixable problem with the webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Required field absent or `null`.
    #[error("missing required field: {}", .0.as_str())]
    Missing(PayloadField),

    /// `symbolId` is not a positive integer.
    #[error("invalid symbolId: must be a positive integer")]
    InvalidSymbolId,

    /// `tradeSide` is not `BUY` or `SELL`.
    #[error("invalid tradeSide: must be 'BUY' or 'SELL'")]
    InvalidTradeSide,

    /// `volume` is not a number greater than zero.
    #[error("invalid volume: must be a number greater than zero")]
    InvalidVolume,
}

impl ValidationError {
    /// The field this error is about.
    #[must_use]
    pub const fn field(&self) -> PayloadField {
        match self {
            Self::Missing(field) => *field,
            Self::InvalidSymbolId => PayloadField::SymbolId,
            Self::InvalidTradeSide => PayloadField::TradeSide,
            Self::InvalidVolume => PayloadField::Volume,
        }
    }
}

/// Validate a webhook payload and build the market order it describes.
///
/// # Errors
///
/// Returns the [`ValidationError`] for the first invalid field.
pub fn translate(payload: &WebhookPayload) -> Result<OrderRequest, ValidationError> {
    let symbol_id = required(payload.symbol_id.as_ref(), PayloadField::SymbolId)?;
    let symbol_id = parse_symbol_id(symbol_id)?;
    let side = required(payload.trade_side.as_ref(), PayloadField::TradeSide)?;
    let side = parse_trade_side(side)?;
    let volume = parse_volume(required(payload.volume.as_ref(), PayloadField::Volume)?)?;

    // volumes whose broker units overflow i64 are refused here
    OrderRequest::new(symbol_id, side, volume).ok_or(ValidationError::InvalidVolume)
}

fn required(value: Option<&Value>, field: PayloadField) -> Result<&Value, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::Missing(field)),
        Some(value) => Ok(value),
    }
}

fn parse_symbol_id(value: &Value) -> Result<i64, ValidationError> {
    value
        .as_i64()
        .filter(|id| *id > 0)
        .ok_or(ValidationError::InvalidSymbolId)
}

fn parse_trade_side(value: &Value) -> Result<TradeSide, ValidationError> {
    value
        .as_str()
        .and_then(TradeSide::parse)
        .ok_or(ValidationError::InvalidTradeSide)
}

fn parse_volume(value: &Value) -> Result<Decimal, ValidationError> {
    let Value::Number(number) = value else {
        return Err(ValidationError::InvalidVolume);
    };

    // serde_json renders floats such as 1e-7 in scientific notation
    let text = number.to_string();
    let volume = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| ValidationError::InvalidVolume)?;

    if volume > Decimal::ZERO {
        Ok(volume)
    } else {
        Err(ValidationError::InvalidVolume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use test_case::test_case;

    fn payload(value: Value) -> WebhookPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn valid_buy_payload() {
        let order = translate(&payload(json!({
            "symbolId": 1234,
            "tradeSide": "BUY",
            "volume": 0.01
        })))
        .unwrap();

        assert_eq!(order.symbol_id(), 1234);
        assert_eq!(order.side(), TradeSide::Buy);
        assert_eq!(order.volume(), dec!(0.01));
    }

    #[test]
    fn lower_case_side_is_normalized() {
        let order = translate(&payload(json!({
            "symbolId": 1,
            "tradeSide": "sell",
            "volume": 3
        })))
        .unwrap();

        assert_eq!(order.side(), TradeSide::Sell);
        assert_eq!(order.volume(), dec!(3));
    }

    #[test_case(json!({"tradeSide": "BUY", "volume": 1}), ValidationError::Missing(PayloadField::SymbolId) ; "missing symbol")]
    #[test_case(json!({"symbolId": 1, "volume": 1}), ValidationError::Missing(PayloadField::TradeSide) ; "missing side")]
    #[test_case(json!({"symbolId": 1, "tradeSide": "BUY"}), ValidationError::Missing(PayloadField::Volume) ; "missing volume")]
    #[test_case(json!({"symbolId": null, "tradeSide": "BUY", "volume": 1}), ValidationError::Missing(PayloadField::SymbolId) ; "null symbol")]
    #[test_case(json!({"symbolId": 0, "tradeSide": "BUY", "volume": 1}), ValidationError::InvalidSymbolId ; "zero symbol")]
    #[test_case(json!({"symbolId": -4, "tradeSide": "BUY", "volume": 1}), ValidationError::InvalidSymbolId ; "negative symbol")]
    #[test_case(json!({"symbolId": 12.5, "tradeSide": "BUY", "volume": 1}), ValidationError::InvalidSymbolId ; "fractional symbol")]
    #[test_case(json!({"symbolId": "1234", "tradeSide": "BUY", "volume": 1}), ValidationError::InvalidSymbolId ; "string symbol")]
    #[test_case(json!({"symbolId": 1234, "tradeSide": "HOLD", "volume": 0.01}), ValidationError::InvalidTradeSide ; "hold side")]
    #[test_case(json!({"symbolId": 1, "tradeSide": 1, "volume": 1}), ValidationError::InvalidTradeSide ; "numeric side")]
    #[test_case(json!({"symbolId": 1, "tradeSide": "BUY", "volume": 0}), ValidationError::InvalidVolume ; "zero volume")]
    #[test_case(json!({"symbolId": 1, "tradeSide": "BUY", "volume": -0.5}), ValidationError::InvalidVolume ; "negative volume")]
    #[test_case(json!({"symbolId": 1, "tradeSide": "BUY", "volume": "1"}), ValidationError::InvalidVolume ; "string volume")]
    #[test_case(json!({"symbolId": 1, "tradeSide": "BUY", "volume": true}), ValidationError::InvalidVolume ; "bool volume")]
    fn invalid_payloads(body: Value, expected: ValidationError) {
        assert_eq!(translate(&payload(body)), Err(expected));
    }

    #[test]
    fn first_invalid_field_wins() {
        let err = translate(&payload(json!({
            "symbolId": 0,
            "tradeSide": "HOLD",
            "volume": -1
        })))
        .unwrap_err();

        assert_eq!(err.field(), PayloadField::SymbolId);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let order = translate(&payload(json!({
            "symbolId": 7,
            "tradeSide": "BUY",
            "volume": 1,
            "comment": "from alert"
        })));
        assert!(order.is_ok());
    }

    #[test]
    fn scientific_notation_volume() {
        let order = translate(&payload(json!({
            "symbolId": 7,
            "tradeSide": "BUY",
            "volume": 1e-7
        })))
        .unwrap();
        assert!(order.volume() > Decimal::ZERO);
    }

    #[test]
    fn volume_too_large_for_broker_is_invalid() {
        let result = translate(&payload(json!({
            "symbolId": 1,
            "tradeSide": "BUY",
            "volume": 1e27
        })));
        assert_eq!(result, Err(ValidationError::InvalidVolume));

        let result = translate(&payload(json!({
            "symbolId": 1,
            "tradeSide": "BUY",
            "volume": 1e40
        })));
        assert_eq!(result, Err(ValidationError::InvalidVolume));
    }

    #[test]
    fn error_messages_name_the_field() {
        assert_eq!(
            ValidationError::InvalidTradeSide.to_string(),
            "invalid tradeSide: must be 'BUY' or 'SELL'"
        );
        assert_eq!(
            ValidationError::Missing(PayloadField::Volume).to_string(),
            "missing required field: volume"
        );
    }

    proptest! {
        #[test]
        fn valid_inputs_always_translate(
            symbol_id in 1_i64..=i64::MAX,
            buy in any::<bool>(),
            lowercase in any::<bool>(),
            cents in 1_u32..10_000_000,
        ) {
            let side = if buy { "BUY" } else { "SELL" };
            let side = if lowercase { side.to_lowercase() } else { side.to_string() };
            let volume = f64::from(cents) / 100.0;

            let order = translate(&payload(json!({
                "symbolId": symbol_id,
                "tradeSide": side,
                "volume": volume,
            })))
            .unwrap();

            prop_assert_eq!(order.symbol_id(), symbol_id);
            prop_assert!(order.volume() > Decimal::ZERO);
        }

        #[test]
        fn non_positive_symbol_ids_are_rejected(symbol_id in i64::MIN..=0) {
            let result = translate(&payload(json!({
                "symbolId": symbol_id,
                "tradeSide": "BUY",
                "volume": 1,
            })));
            prop_assert_eq!(result, Err(ValidationError::InvalidSymbolId));
        }

        #[test]
        fn other_sides_are_rejected(side in "[A-Za-z]{0,8}") {
            prop_assume!(!side.eq_ignore_ascii_case("BUY") && !side.eq_ignore_ascii_case("SELL"));
            let result = translate(&payload(json!({
                "symbolId": 1,
                "tradeSide": side,
                "volume": 1,
            })));
            prop_assert_eq!(result, Err(ValidationError::InvalidTradeSide));
        }
    }
}
