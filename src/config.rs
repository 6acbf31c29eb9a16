use rust_decimal::Decimal;
use serde::Deserialize;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Currency every catalog rate is quoted against.
    pub base_currency: String,
    /// Relative distance a swap's exchange rate may have from the catalog
    /// rate, e.g. `0.02` for 2%. Without it swaps are only checked for
    /// internal consistency.
    pub max_rate_deviation: Option<Decimal>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            max_rate_deviation: None,
        }
    }
}
