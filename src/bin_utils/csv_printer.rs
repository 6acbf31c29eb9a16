use std::io::Write;

use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct WalletRow {
    pub customer: String,
    pub currency: String,
    pub available: Decimal,
    pub lien: Decimal,
    pub total: Decimal,
    pub state: &'static str,
}

pub fn print_wallets<W>(
    output: &mut W,
    wallets: impl Iterator<Item = WalletRow>,
) -> anyhow::Result<()>
where
    W: Write,
{
    let mut writer = Writer::from_writer(output);
    for wallet in wallets {
        if let Err(err) = writer.serialize(wallet) {
            anyhow::bail!("Failed to write to CSV: {err}")
        }
    }
    if let Err(err) = writer.flush() {
        anyhow::bail!("Failed to flush CSV writer: {err}")
    }
    Ok(())
}
