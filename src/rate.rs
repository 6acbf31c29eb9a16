use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::money::Currency;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateError {
    #[error("Currency {0} not found")]
    CurrencyNotFound(String),
    #[error("Currency {code} has no usable buy rate configured")]
    InvalidExchangeRateConfiguration { code: String },
    #[error("Quote amounts must be positive (fee may be zero)")]
    InvalidQuoteAmount,
}

/// Price of a currency conversion, computed per request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub base_currency: String,
    pub from_currency: String,
    pub to_currency: String,
    pub from_amount: Decimal,
    pub fee: Decimal,
    pub rate: Decimal,
    pub gross_amount: Decimal,
    pub to_amount: Decimal,
    pub date: DateTime<Utc>,
}

fn find<'a>(currencies: &'a [Currency], code: &str) -> Result<&'a Currency, RateError> {
    currencies
        .iter()
        .find(|c| c.code == code)
        .ok_or_else(|| RateError::CurrencyNotFound(code.to_string()))
}

/// `1 / from.buy_rate`, refusing a zero buy rate instead of silently pricing at zero.
fn inverse_buy_rate(from: &Currency) -> Result<Decimal, RateError> {
    if from.buy_rate.is_zero() {
        return Err(RateError::InvalidExchangeRateConfiguration {
            code: from.code.clone(),
        });
    }
    Decimal::ONE
        .checked_div(from.buy_rate)
        .ok_or_else(|| RateError::InvalidExchangeRateConfiguration {
            code: from.code.clone(),
        })
}

/// How many units of `to` one unit of `from` buys.
pub fn calculate_rate(
    currencies: &[Currency],
    base: &str,
    from: &str,
    to: &str,
) -> Result<Decimal, RateError> {
    if from == to {
        return Ok(Decimal::ONE);
    }
    if from == base {
        return Ok(find(currencies, to)?.sell_rate);
    }
    let from = find(currencies, from)?;
    if to == base {
        return inverse_buy_rate(from);
    }
    let to = find(currencies, to)?;
    inverse_buy_rate(from)?
        .checked_mul(to.sell_rate)
        .ok_or_else(|| RateError::InvalidExchangeRateConfiguration {
            code: to.code.clone(),
        })
}

pub fn build_quote(
    currencies: &[Currency],
    base: &str,
    from: &str,
    to: &str,
    from_amount: Decimal,
    fee: Decimal,
) -> Result<Quote, RateError> {
    if from_amount <= Decimal::ZERO || fee < Decimal::ZERO {
        return Err(RateError::InvalidQuoteAmount);
    }
    let rate = calculate_rate(currencies, base, from, to)?;
    let from_currency = find(currencies, from)?;
    let to_currency = find(currencies, to)?;
    let gross_amount = from_amount
        .checked_add(fee)
        .ok_or(RateError::InvalidQuoteAmount)?;
    let to_amount = from_amount
        .checked_mul(rate)
        .ok_or(RateError::InvalidQuoteAmount)?;

    Ok(Quote {
        base_currency: base.to_string(),
        from_currency: from.to_string(),
        to_currency: to.to_string(),
        from_amount,
        fee,
        rate,
        gross_amount: from_currency.round_up(gross_amount),
        to_amount: to_currency.round_up(to_amount),
        date: Utc::now(),
    })
}
