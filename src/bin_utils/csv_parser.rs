use std::io::Read;

use csv::{DeserializeRecordsIntoIter, Trim};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Open,
    Credit,
    Debit,
    Transfer,
    Swap,
    Lien,
    Unlien,
    Freeze,
    Unfreeze,
    Close,
    Reopen,
}

/// One line of a replay file. Which optional columns are needed depends on
/// `kind`.
#[derive(Debug, Deserialize)]
pub struct OperationRow {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub customer: String,
    pub currency: String,
    pub amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub to_customer: Option<String>,
    pub to_currency: Option<String>,
    pub to_amount: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub reason: Option<String>,
}

/// Parses an operation list in CSV format, yielding the line each row
/// started on.
pub struct CsvOperationParser<R> {
    header_error: Option<csv::Error>,
    iter: DeserializeRecordsIntoIter<R, OperationRow>,
}

impl<R> CsvOperationParser<R>
where
    R: Read,
{
    pub fn new(source: R) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(source);
        // read the header row up front so reported lines point at data rows
        let header_error = reader.headers().err();

        Self {
            header_error,
            iter: reader.into_deserialize(),
        }
    }
}

impl<R> Iterator for CsvOperationParser<R>
where
    R: Read,
{
    type Item = (u64, Result<OperationRow, csv::Error>);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.header_error.take() {
            return Some((1, Err(err)));
        }
        let curr_line = self.iter.reader().position().line();
        self.iter.next().map(|row| (curr_line, row))
    }
}
