use std::{collections::BTreeMap, io::Read};

use csv::Trim;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A currency and its buy/sell prices against the base currency.
///
/// `precision` is the number of fraction digits every amount in this
/// currency is rounded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub precision: u32,
    pub buy_rate: Decimal,
    pub sell_rate: Decimal,
}

impl Currency {
    pub fn new(
        code: impl Into<String>,
        precision: u32,
        buy_rate: Decimal,
        sell_rate: Decimal,
    ) -> Self {
        Self {
            code: code.into(),
            precision,
            buy_rate,
            sell_rate,
        }
    }

    /// Rounds `amount` up (towards positive infinity) to this currency's precision.
    pub fn round_up(&self, amount: Decimal) -> Decimal {
        round_up(amount, self.precision)
    }
}

pub fn round_up(amount: Decimal, precision: u32) -> Decimal {
    amount.round_dp_with_strategy(precision, RoundingStrategy::ToPositiveInfinity)
}

/// Anything able to hand out a snapshot of the known currencies.
pub trait CurrencySource: Send + Sync {
    fn list_currencies(&self) -> Vec<Currency>;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read currency catalog: {0}")]
    Csv(#[from] csv::Error),
    #[error("Currency {0} is listed more than once")]
    DuplicateCurrency(String),
    #[error("Currency {code} has a negative rate")]
    NegativeRate { code: String },
}

/// Fixed set of currencies keyed by code.
#[derive(Debug, Default, Clone)]
pub struct CurrencyCatalog {
    currencies: BTreeMap<String, Currency>,
}

impl CurrencyCatalog {
    pub fn new(currencies: impl IntoIterator<Item = Currency>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for currency in currencies {
            if currency.buy_rate.is_sign_negative() || currency.sell_rate.is_sign_negative() {
                return Err(CatalogError::NegativeRate {
                    code: currency.code,
                });
            }
            if catalog.currencies.contains_key(&currency.code) {
                return Err(CatalogError::DuplicateCurrency(currency.code));
            }
            catalog.currencies.insert(currency.code.clone(), currency);
        }
        Ok(catalog)
    }

    /// Loads `code,precision,buy_rate,sell_rate` rows.
    pub fn from_csv<R: Read>(source: R) -> Result<Self, CatalogError> {
        let mut reader = csv::ReaderBuilder::new().trim(Trim::All).from_reader(source);
        let currencies = reader
            .deserialize::<Currency>()
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(currencies)
    }

    pub fn get(&self, code: &str) -> Option<&Currency> {
        self.currencies.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.currencies.contains_key(code)
    }
}

impl CurrencySource for CurrencyCatalog {
    fn list_currencies(&self) -> Vec<Currency> {
        self.currencies.values().cloned().collect()
    }
}
