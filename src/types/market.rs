use serde::{Deserialize, Serialize};

/// A traded symbol's latest ticker row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub symbol: String,
    pub price: f64,
    pub price_24h_change: f64,
}

impl Market {
    pub fn new(symbol: impl Into<String>, price: f64, price_24h_change: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            price_24h_change,
        }
    }
}

/// Look up the last price of a symbol in a market snapshot.
pub fn price_of(markets: &[Market], symbol: &str) -> Option<f64> {
    markets
        .iter()
        .find(|m| m.symbol == symbol)
        .map(|m| m.price)
        .filter(|p| *p > 0.0)
}

/// Exchange rounding rules for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolPrecisionInfo {
    /// Decimal places allowed on order quantity.
    pub quantity_precision: u32,
    /// Decimal places allowed on prices.
    pub price_precision: u32,
    pub min_qty: f64,
    pub max_qty: f64,
    pub step_size: f64,
}

impl SymbolPrecisionInfo {
    /// Conservative rules used when the exchange did not report a symbol.
    pub const FALLBACK: SymbolPrecisionInfo = SymbolPrecisionInfo {
        quantity_precision: 3,
        price_precision: 2,
        min_qty: 0.0,
        max_qty: 0.0,
        step_size: 0.001,
    };

    pub fn round_quantity(&self, value: f64) -> f64 {
        round_to_precision(value, self.quantity_precision)
    }

    pub fn round_price(&self, value: f64) -> f64 {
        round_to_precision(value, self.price_precision)
    }
}

impl Default for SymbolPrecisionInfo {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Round half away from zero to `precision` decimal places.
pub fn round_to_precision(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_precision() {
        assert_eq!(round_to_precision(1.23456, 2), 1.23);
        assert_eq!(round_to_precision(1.235, 0), 1.0);
        assert_eq!(round_to_precision(68000.126, 2), 68000.13);
        assert_eq!(round_to_precision(5000.0, 3), 5000.0);
    }

    #[test]
    fn test_rounding_is_idempotent() {
        let samples = [0.1234567, 1.005, 68123.456789, 0.000149, 3.14159, 72000.0];
        for precision in 0..=6 {
            for value in samples {
                let once = round_to_precision(value, precision);
                let twice = round_to_precision(once, precision);
                assert_eq!(once, twice, "value {} precision {}", value, precision);
            }
        }
    }

    #[test]
    fn test_fallback_precision() {
        let info = SymbolPrecisionInfo::default();
        assert_eq!(info.quantity_precision, 3);
        assert_eq!(info.price_precision, 2);
        assert_eq!(info.round_quantity(1.23456), 1.235);
        assert_eq!(info.round_price(1.23456), 1.23);
    }

    #[test]
    fn test_price_of() {
        let markets = vec![
            Market::new("BTCUSDT", 70000.0, 1.5),
            Market::new("ETHUSDT", 3500.0, -0.4),
        ];
        assert_eq!(price_of(&markets, "ETHUSDT"), Some(3500.0));
        assert_eq!(price_of(&markets, "SOLUSDT"), None);
    }

    #[test]
    fn test_market_serializes_camel_case() {
        let json = serde_json::to_string(&Market::new("BTCUSDT", 1.0, 2.0)).unwrap();
        assert!(json.contains("\"price24hChange\":2.0"));
    }
}
