//! Replays a CSV list of operations against an in-memory engine and prints the
//! resulting wallets. Used by the `wallet-core` binary and the integration
//! tests.

use std::io::{Read, Write};

use anyhow::Result;
use csv_parser::{CsvOperationParser, OperationKind, OperationRow};
use csv_printer::{WalletRow, print_wallets};
use thiserror::Error;
use tracing::info;

use crate::{
    command::{
        CreditRequest, DebitRequest, LienRequest, StateChangeRequest, SwapRequest, TransferRequest,
    },
    config::EngineConfig,
    engine::Engine,
    error::OperationError,
    ledger::TransactionStatus,
    money::CurrencyCatalog,
    store::in_memory::InMemoryStore,
    wallet::WalletId,
};

pub mod csv_parser;
pub mod csv_printer;

const REPLAY_ACTOR: &str = "replay";

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Malformed row: {0}")]
    Csv(#[from] csv::Error),
    #[error("Column `{0}` is required for this operation")]
    MissingField(&'static str),
    #[error(transparent)]
    Operation(#[from] OperationError),
}

fn required<T>(value: Option<T>, column: &'static str) -> Result<T, ReplayError> {
    value.ok_or(ReplayError::MissingField(column))
}

pub struct Service<'w, R, W: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub catalog: Option<CurrencyCatalog>,
    pub config: EngineConfig,
    pub error_printer: Box<dyn FnMut(u64, ReplayError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvOperationParser::new(self.input);

        let mut builder = Engine::builder(InMemoryStore::new()).config(self.config);
        if let Some(catalog) = self.catalog {
            builder = builder.catalog(catalog);
        }
        let engine = builder.build();

        let mut rows = 0usize;
        for (line, row) in parser {
            rows += 1;
            let result = row
                .map_err(ReplayError::from)
                .and_then(|row| apply(&engine, &row));
            if let Err(err) = result {
                (self.error_printer)(line, err);
            }
        }

        let mut wallets = engine.store().wallets();
        wallets.sort_by(|a, b| {
            (&a.customer_id, &a.currency_code).cmp(&(&b.customer_id, &b.currency_code))
        });
        info!(rows, wallets = wallets.len(), "replay finished");

        print_wallets(
            self.output,
            wallets.into_iter().map(|wallet| WalletRow {
                available: wallet.available(),
                lien: wallet.lien_balance(),
                total: wallet.total_balance(),
                state: wallet.state().name(),
                customer: wallet.customer_id,
                currency: wallet.currency_code,
            }),
        )
    }
}

fn find_wallet(
    engine: &Engine<InMemoryStore>,
    customer: &str,
    currency: &str,
) -> Result<WalletId, ReplayError> {
    Ok(engine.wallet_for(customer, currency)?.id)
}

fn apply(engine: &Engine<InMemoryStore>, row: &OperationRow) -> Result<(), ReplayError> {
    if row.kind == OperationKind::Open {
        engine.open_wallet(&row.customer, &row.currency)?;
        return Ok(());
    }

    let wallet_id = find_wallet(engine, &row.customer, &row.currency)?;
    let fee = row.fee.unwrap_or_default();
    let state_change = || StateChangeRequest {
        wallet_id,
        reason: row.reason.clone().unwrap_or_default(),
        initiated_by: REPLAY_ACTOR.to_string(),
    };
    let lien = || -> Result<LienRequest, ReplayError> {
        Ok(LienRequest {
            wallet_id,
            amount: required(row.amount, "amount")?,
            reference_id: row.reason.clone().unwrap_or_else(|| REPLAY_ACTOR.to_string()),
            description: None,
        })
    };

    match row.kind {
        OperationKind::Open => {}
        OperationKind::Credit => {
            engine.credit(&CreditRequest {
                wallet_id,
                amount: required(row.amount, "amount")?,
                fee,
                status: TransactionStatus::Completed,
                narration: row.reason.clone(),
            })?;
        }
        OperationKind::Debit => {
            engine.debit(&DebitRequest {
                wallet_id,
                amount: required(row.amount, "amount")?,
                fee,
                status: TransactionStatus::Completed,
                narration: row.reason.clone(),
            })?;
        }
        OperationKind::Transfer => {
            let to_customer = row.to_customer.as_deref().unwrap_or(&row.customer);
            let to_currency = row.to_currency.as_deref().unwrap_or(&row.currency);
            engine.transfer(&TransferRequest {
                source_wallet_id: wallet_id,
                destination_wallet_id: find_wallet(engine, to_customer, to_currency)?,
                amount: required(row.amount, "amount")?,
                fee,
                narration: row.reason.clone(),
            })?;
        }
        OperationKind::Swap => {
            let to_currency = required(row.to_currency.as_deref(), "to_currency")?;
            engine.swap(&SwapRequest {
                source_wallet_id: wallet_id,
                destination_wallet_id: find_wallet(engine, &row.customer, to_currency)?,
                source_amount: required(row.amount, "amount")?,
                destination_amount: required(row.to_amount, "to_amount")?,
                exchange_rate: required(row.rate, "rate")?,
                fee,
                narration: row.reason.clone(),
            })?;
        }
        OperationKind::Lien => {
            engine.lien(&lien()?)?;
        }
        OperationKind::Unlien => {
            engine.unlien(&lien()?)?;
        }
        OperationKind::Freeze => {
            engine.freeze(&state_change())?;
        }
        OperationKind::Unfreeze => {
            engine.unfreeze(&state_change())?;
        }
        OperationKind::Close => {
            engine.close(&state_change())?;
        }
        OperationKind::Reopen => {
            engine.reopen(&state_change())?;
        }
    }
    Ok(())
}
