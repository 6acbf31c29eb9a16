use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{
    command::{
        Command, CreditRequest, DebitRequest, LienRequest, ReverseRequest, StateChangeRequest,
        SwapRequest, TransferRequest,
    },
    config::EngineConfig,
    error::{OperationError, OperationResult},
    id::{IdGenerator, RandomIds},
    ledger::{
        Transaction, TransactionId, TransactionStatus,
        reversal::{self, Reversal},
    },
    money::CurrencySource,
    rate::{self, Quote, RateError},
    records::{AuxRecord, StateAction},
    store::{CommitBatch, StoreError, TransactionPage, WalletStore},
    wallet::{Wallet, WalletId},
};

pub mod locks;
pub mod ops;

use locks::WalletLocks;
use ops::{LienPosting, PairedPosting, Posting, StateChange};

/// What [`Engine::execute`] produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Posting(Posting),
    Paired(PairedPosting),
    Lien(LienPosting),
    StateChange(StateChange),
    Reversal(Reversal),
}

/// Runs operations against a [`WalletStore`].
///
/// Every operation locks the wallets it touches (pairs in ascending id
/// order), loads fresh copies, runs the matching function from [`ops`] and
/// commits wallets, entries and records in one batch. A
/// [`StoreError::ConcurrentModification`] is returned as is; retrying is up to
/// the caller.
pub struct Engine<S> {
    store: S,
    ids: Arc<dyn IdGenerator>,
    catalog: Option<Arc<dyn CurrencySource>>,
    config: EngineConfig,
    locks: WalletLocks,
}

/// The builder for [`Engine`].
pub struct EngineBuilder<S> {
    store: S,
    ids: Arc<dyn IdGenerator>,
    catalog: Option<Arc<dyn CurrencySource>>,
    config: EngineConfig,
}

impl<S: WalletStore> EngineBuilder<S> {
    pub fn ids(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    /// Enables currency checks on wallet opening, swap rate checks and quotes.
    pub fn catalog(mut self, catalog: impl CurrencySource + 'static) -> Self {
        self.catalog = Some(Arc::new(catalog));
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Engine<S> {
        Engine {
            store: self.store,
            ids: self.ids,
            catalog: self.catalog,
            config: self.config,
            locks: WalletLocks::default(),
        }
    }
}

impl<S: WalletStore> Engine<S> {
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder {
            store,
            ids: Arc::new(RandomIds),
            catalog: None,
            config: EngineConfig::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn commit(&self, batch: CommitBatch<'_>) -> OperationResult<()> {
        self.store.commit(batch).map_err(|err| {
            if let StoreError::ConcurrentModification { wallet_id } = &err {
                warn!(%wallet_id, "commit rejected, wallet changed since it was loaded");
            }
            OperationError::from(err)
        })
    }

    fn require_currency(&self, code: &str) -> OperationResult<()> {
        if let Some(catalog) = &self.catalog
            && !catalog.list_currencies().iter().any(|c| c.code == code)
        {
            return Err(RateError::CurrencyNotFound(code.to_string()).into());
        }
        Ok(())
    }

    pub fn open_wallet(&self, customer_id: &str, currency_code: &str) -> OperationResult<Wallet> {
        self.require_currency(currency_code)?;
        let wallet = self
            .store
            .create_wallet(Wallet::new(self.ids.next_id(), customer_id, currency_code))?;
        debug!(wallet_id = %wallet.id, customer_id, currency_code, "wallet opened");
        Ok(wallet)
    }

    pub fn wallet(&self, id: WalletId) -> OperationResult<Wallet> {
        Ok(self.store.load_wallet(id)?)
    }

    pub fn wallet_for(&self, customer_id: &str, currency_code: &str) -> OperationResult<Wallet> {
        Ok(self
            .store
            .load_wallet_by_customer_and_currency(customer_id, currency_code)?)
    }

    pub fn transaction(&self, id: TransactionId) -> OperationResult<Transaction> {
        Ok(self.store.load_transaction(id)?)
    }

    pub fn transactions(
        &self,
        wallet_id: WalletId,
        page: &TransactionPage,
    ) -> OperationResult<Vec<Transaction>> {
        Ok(self.store.list_transactions(wallet_id, page)?)
    }

    pub fn credit(&self, request: &CreditRequest) -> OperationResult<Posting> {
        let _guard = self.locks.lock(request.wallet_id);
        let wallet = self.store.load_wallet(request.wallet_id)?;
        let mut posting = ops::credit(self.ids.as_ref(), wallet, request)?;
        self.commit(
            CommitBatch::new()
                .wallet(&mut posting.wallet)
                .transaction(&posting.transaction),
        )?;
        debug!(wallet_id = %request.wallet_id, amount = %request.amount, "credit committed");
        Ok(posting)
    }

    pub fn debit(&self, request: &DebitRequest) -> OperationResult<Posting> {
        let _guard = self.locks.lock(request.wallet_id);
        let wallet = self.store.load_wallet(request.wallet_id)?;
        let mut posting = ops::debit(self.ids.as_ref(), wallet, request)?;
        self.commit(
            CommitBatch::new()
                .wallet(&mut posting.wallet)
                .transaction(&posting.transaction),
        )?;
        debug!(wallet_id = %request.wallet_id, amount = %request.amount, "debit committed");
        Ok(posting)
    }

    fn commit_pair(&self, posting: &mut PairedPosting) -> OperationResult<()> {
        self.commit(
            CommitBatch::new()
                .wallet(&mut posting.source)
                .wallet(&mut posting.destination)
                .transaction(&posting.debit)
                .transaction(&posting.credit),
        )
    }

    pub fn transfer(&self, request: &TransferRequest) -> OperationResult<PairedPosting> {
        request.validate()?;
        let _guard = self
            .locks
            .lock_pair(request.source_wallet_id, request.destination_wallet_id);
        let source = self.store.load_wallet(request.source_wallet_id)?;
        let destination = self.store.load_wallet(request.destination_wallet_id)?;
        let mut posting = ops::transfer(self.ids.as_ref(), source, destination, request)?;
        self.commit_pair(&mut posting)?;
        debug!(
            source = %request.source_wallet_id,
            destination = %request.destination_wallet_id,
            amount = %request.amount,
            "transfer committed"
        );
        Ok(posting)
    }

    /// Compares the supplied rate with the catalog rate when a deviation
    /// limit is configured.
    fn check_reference_rate(
        &self,
        source: &Wallet,
        destination: &Wallet,
        supplied: Decimal,
    ) -> OperationResult<()> {
        let (Some(catalog), Some(max_deviation)) =
            (&self.catalog, self.config.max_rate_deviation)
        else {
            return Ok(());
        };
        let reference = rate::calculate_rate(
            &catalog.list_currencies(),
            &self.config.base_currency,
            &source.currency_code,
            &destination.currency_code,
        )?;
        let tolerance = reference
            .checked_mul(max_deviation)
            .unwrap_or(Decimal::MAX);
        if (supplied - reference).abs() > tolerance {
            return Err(OperationError::ExchangeRateOutOfRange { supplied, reference });
        }
        Ok(())
    }

    pub fn swap(&self, request: &SwapRequest) -> OperationResult<PairedPosting> {
        request.validate()?;
        let _guard = self
            .locks
            .lock_pair(request.source_wallet_id, request.destination_wallet_id);
        let source = self.store.load_wallet(request.source_wallet_id)?;
        let destination = self.store.load_wallet(request.destination_wallet_id)?;
        self.require_currency(&source.currency_code)?;
        self.require_currency(&destination.currency_code)?;
        if source.currency_code != destination.currency_code
            && source.customer_id == destination.customer_id
        {
            self.check_reference_rate(&source, &destination, request.exchange_rate)?;
        }
        let mut posting = ops::swap(self.ids.as_ref(), source, destination, request)?;
        self.commit_pair(&mut posting)?;
        debug!(
            source = %request.source_wallet_id,
            destination = %request.destination_wallet_id,
            source_amount = %request.source_amount,
            destination_amount = %request.destination_amount,
            "swap committed"
        );
        Ok(posting)
    }

    fn commit_lien(&self, posting: &mut LienPosting) -> OperationResult<()> {
        self.commit(
            CommitBatch::new()
                .wallet(&mut posting.wallet)
                .record(AuxRecord::Lien(posting.record.clone())),
        )
    }

    pub fn lien(&self, request: &LienRequest) -> OperationResult<LienPosting> {
        let _guard = self.locks.lock(request.wallet_id);
        let wallet = self.store.load_wallet(request.wallet_id)?;
        let mut posting = ops::lien(self.ids.as_ref(), wallet, request)?;
        self.commit_lien(&mut posting)?;
        debug!(
            wallet_id = %request.wallet_id,
            amount = %request.amount,
            reference = %request.reference_id,
            "lien placed"
        );
        Ok(posting)
    }

    pub fn unlien(&self, request: &LienRequest) -> OperationResult<LienPosting> {
        let _guard = self.locks.lock(request.wallet_id);
        let wallet = self.store.load_wallet(request.wallet_id)?;
        let mut posting = ops::unlien(self.ids.as_ref(), wallet, request)?;
        self.commit_lien(&mut posting)?;
        debug!(
            wallet_id = %request.wallet_id,
            amount = %request.amount,
            reference = %request.reference_id,
            "lien released"
        );
        Ok(posting)
    }

    fn change_state(
        &self,
        action: StateAction,
        request: &StateChangeRequest,
    ) -> OperationResult<StateChange> {
        let _guard = self.locks.lock(request.wallet_id);
        let wallet = self.store.load_wallet(request.wallet_id)?;
        let mut change = ops::change_state(self.ids.as_ref(), wallet, action, request)?;
        self.commit(
            CommitBatch::new()
                .wallet(&mut change.wallet)
                .record(AuxRecord::StateChange(change.record.clone())),
        )?;
        debug!(
            wallet_id = %request.wallet_id,
            ?action,
            initiated_by = %request.initiated_by,
            "wallet state changed"
        );
        Ok(change)
    }

    pub fn freeze(&self, request: &StateChangeRequest) -> OperationResult<StateChange> {
        self.change_state(StateAction::Freeze, request)
    }

    pub fn unfreeze(&self, request: &StateChangeRequest) -> OperationResult<StateChange> {
        self.change_state(StateAction::Unfreeze, request)
    }

    pub fn close(&self, request: &StateChangeRequest) -> OperationResult<StateChange> {
        self.change_state(StateAction::Close, request)
    }

    pub fn reopen(&self, request: &StateChangeRequest) -> OperationResult<StateChange> {
        self.change_state(StateAction::Reopen, request)
    }

    pub fn reverse(&self, request: &ReverseRequest) -> OperationResult<Reversal> {
        let wallet_id = self.store.load_transaction(request.transaction_id)?.wallet_id;
        let _guard = self.locks.lock(wallet_id);
        // reload under the lock, the first read only told us which wallet to lock
        let original = self.store.load_transaction(request.transaction_id)?;
        let wallet = self.store.load_wallet(wallet_id)?;
        let mut reversal = reversal::reverse(self.ids.as_ref(), original, wallet)?;
        self.commit(
            CommitBatch::new()
                .wallet(&mut reversal.wallet)
                .transaction(&reversal.original)
                .transaction(&reversal.reversal),
        )?;
        debug!(%wallet_id, transaction_id = %request.transaction_id, "transaction reversed");
        Ok(reversal)
    }

    /// Settles a pending entry, see [`ops::settle`]. The owning wallet is
    /// committed along with it so a concurrent reversal of the same entry
    /// shows up as a conflict.
    pub fn update_status(
        &self,
        transaction_id: TransactionId,
        next: TransactionStatus,
    ) -> OperationResult<Posting> {
        let wallet_id = self.store.load_transaction(transaction_id)?.wallet_id;
        let _guard = self.locks.lock(wallet_id);
        let transaction = self.store.load_transaction(transaction_id)?;
        let wallet = self.store.load_wallet(wallet_id)?;
        let mut posting = ops::settle(wallet, transaction, next)?;
        self.commit(
            CommitBatch::new()
                .wallet(&mut posting.wallet)
                .transaction(&posting.transaction),
        )?;
        debug!(%transaction_id, status = %next, "transaction status updated");
        Ok(posting)
    }

    pub fn quote(
        &self,
        from: &str,
        to: &str,
        from_amount: Decimal,
        fee: Decimal,
    ) -> OperationResult<Quote> {
        let currencies = self
            .catalog
            .as_ref()
            .map(|catalog| catalog.list_currencies())
            .unwrap_or_default();
        Ok(rate::build_quote(
            &currencies,
            &self.config.base_currency,
            from,
            to,
            from_amount,
            fee,
        )?)
    }

    pub fn execute(&self, command: &Command) -> OperationResult<Outcome> {
        match command {
            Command::Credit(request) => self.credit(request).map(Outcome::Posting),
            Command::Debit(request) => self.debit(request).map(Outcome::Posting),
            Command::Transfer(request) => self.transfer(request).map(Outcome::Paired),
            Command::Swap(request) => self.swap(request).map(Outcome::Paired),
            Command::Lien(request) => self.lien(request).map(Outcome::Lien),
            Command::Unlien(request) => self.unlien(request).map(Outcome::Lien),
            Command::Freeze(request) => self.freeze(request).map(Outcome::StateChange),
            Command::Unfreeze(request) => self.unfreeze(request).map(Outcome::StateChange),
            Command::Close(request) => self.close(request).map(Outcome::StateChange),
            Command::Reopen(request) => self.reopen(request).map(Outcome::StateChange),
            Command::Reverse(request) => self.reverse(request).map(Outcome::Reversal),
        }
    }
}
