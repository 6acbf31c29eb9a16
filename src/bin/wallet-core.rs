use std::fs::File;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wallet_core::{
    bin_utils::{ReplayError, Service},
    config::EngineConfig,
    money::CurrencyCatalog,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wallet_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let filename = args
        .next()
        .context("Expected an operations file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let catalog = match args.next() {
        Some(path) => {
            let source = File::open(&path).with_context(|| format!("Failed to open `{path}`"))?;
            let catalog = CurrencyCatalog::from_csv(source)
                .with_context(|| format!("Failed to load currencies from `{path}`"))?;
            Some(catalog)
        }
        None => None,
    };

    let mut config = EngineConfig::default();
    if let Ok(base) = std::env::var("WALLET_BASE_CURRENCY") {
        config.base_currency = base;
    }
    info!(
        base_currency = %config.base_currency,
        catalog = catalog.is_some(),
        "replaying `{filename}`"
    );

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        catalog,
        config,
        error_printer: Box::new(|line, err| match err {
            ReplayError::Operation(err) => {
                // rejected operations are expected in a replay, not technical errors
                tracing::debug!(line, %err, "operation rejected")
            }
            err => eprintln!("Error at line {line}: {err}"),
        }),
    };
    service.run()
}
