// marketplace_payments/src/pricing.rs
// Fee-inclusive gateway amounts, computed in integer minor units

use crate::error::PaymentError;

/// Processing fee in basis points (1.5%).
pub const FEE_BASIS_POINTS: i64 = 150;
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;
const MAX_AMOUNT_MINOR: i64 = 1_000_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatewayAmount {
    /// Whole currency units charged, fee included (`amount_naira` on the wire).
    pub major_units: i64,
    /// What the gateway receives.
    pub minor_units: i64,
}

/// Converts a client-supplied amount (number or numeric string, whole units)
/// into minor units.
pub fn parse_amount_minor(raw: &serde_json::Value) -> Result<i64, PaymentError> {
    let amount = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| PaymentError::Validation("Amount must be a number".to_string()))?;

    if !amount.is_finite() || amount <= 0.0 {
        return Err(PaymentError::Validation(
            "Amount must be greater than zero".to_string(),
        ));
    }

    let minor = (amount * MINOR_UNITS_PER_MAJOR as f64).round();
    if minor < 1.0 || minor >= MAX_AMOUNT_MINOR as f64 {
        return Err(PaymentError::Validation("Amount is out of range".to_string()));
    }
    Ok(minor as i64)
}

/// Applies the fee and rounds up to the next whole unit so the fee is never
/// under-collected.
pub fn gateway_amount(amount_minor: i64) -> GatewayAmount {
    let denominator = MINOR_UNITS_PER_MAJOR * 10_000;
    let numerator = amount_minor * (10_000 + FEE_BASIS_POINTS);
    let major_units = (numerator + denominator - 1) / denominator;
    GatewayAmount {
        major_units,
        minor_units: major_units * MINOR_UNITS_PER_MAJOR,
    }
}
