//! Per-token pricing for the models we know about.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Input/output cost per token in USD. Unknown models are priced at zero.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    let model = model.to_lowercase();
    if model.contains("opus") {
        (dec!(0.000015), dec!(0.000075))
    } else if model.contains("sonnet") {
        (dec!(0.000003), dec!(0.000015))
    } else if model.contains("haiku") {
        (dec!(0.0000008), dec!(0.000004))
    } else if model.contains("gpt-4o-mini") {
        (dec!(0.00000015), dec!(0.0000006))
    } else if model.contains("gpt-4o") {
        (dec!(0.0000025), dec!(0.00001))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mini_is_matched_before_full_gpt4o() {
        let (mini_in, _) = model_cost("gpt-4o-mini");
        let (full_in, _) = model_cost("gpt-4o");
        assert!(mini_in < full_in);
    }

    #[test]
    fn unknown_model_is_free() {
        assert_eq!(model_cost("local-llama"), (Decimal::ZERO, Decimal::ZERO));
    }
}
