//! Price family: `[retail, wholesale]`, missing tier coerced to `0`.

use serde_json::{json, Value};

use crate::erp::PriceQuote;

pub fn transform_price(quote: PriceQuote) -> Value {
    json!([quote.retail, quote.wholesale])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tiers_pass_through_as_zero() {
        let quote = PriceQuote { retail: 0.0, wholesale: 12.5 };
        assert_eq!(transform_price(quote), json!([0.0, 12.5]));
    }
}
