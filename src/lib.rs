/// Currencies, rounding and the currency catalog.
pub mod money;

/// Exchange rate calculation and quotes against a base currency.
pub mod rate;

/// Id generation, injectable so tests can use deterministic ids.
pub mod id;

/// A single customer balance in one currency, and every rule about how it
/// may change.
pub mod wallet;

/// Transaction entries, their status machine and reversal.
pub mod ledger;

/// Lien and wallet state audit records.
pub mod records;

/// Requests accepted by the engine.
pub mod command;

/// Coordinates operations: locking, loading, applying and committing.
///
/// The pure operation functions live in [`engine::ops`] and never touch
/// storage, so a failed operation simply drops its wallet copies.
pub mod engine;

/// Engine settings.
pub mod config;

/// Persistence interface, plus "in memory" implementation.
///
/// Writes go through [`store::CommitBatch`], applied all or nothing and
/// guarded by per-wallet version tokens.
pub mod store;

/// The error returned by every engine operation.
pub mod error;

/// Ideally, this module should exist in its own crate, as a way to bootstrap
/// the engine from CSV. It is used by the binary and the integration tests,
/// so it lives here.
pub mod bin_utils;
