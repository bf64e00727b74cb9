//! Per-token pricing for supported models (USD).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Return (input, output) cost per token for a model name.
///
/// Unknown models fall back to gemini-2.0-flash pricing.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    match model {
        m if m.starts_with("gemini-2.5-pro") => (dec!(0.00000125), dec!(0.00001)),
        m if m.starts_with("gemini-2.5-flash-lite") => (dec!(0.0000001), dec!(0.0000004)),
        m if m.starts_with("gemini-2.5-flash") => (dec!(0.0000003), dec!(0.0000025)),
        m if m.starts_with("gemini-2.0-flash-lite") => (dec!(0.000000075), dec!(0.0000003)),
        _ => (dec!(0.0000001), dec!(0.0000004)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_lite_is_matched_before_flash() {
        assert_eq!(
            model_cost("gemini-2.5-flash-lite").0,
            dec!(0.0000001)
        );
        assert_eq!(model_cost("gemini-2.5-flash").0, dec!(0.0000003));
    }

    #[test]
    fn unknown_model_uses_default() {
        assert_eq!(model_cost("mystery"), model_cost("gemini-2.0-flash"));
    }
}
