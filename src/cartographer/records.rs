//! Snapshot records
//!
//! Column names follow the indexer export: `truster`/`trustee` for trust
//! relations, `account`/`tokenAddress`/`demurragedTotalBalance` for balances.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::IngestionError;

/// `truster` accepts tokens issued by `trustee`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRecord {
    pub truster: String,
    pub trustee: String,
}

impl TrustRecord {
    pub fn new(truster: impl Into<String>, trustee: impl Into<String>) -> Self {
        Self {
            truster: truster.into(),
            trustee: trustee.into(),
        }
    }
}

/// Raw balance of `token_address` held by `account`, 18-decimal fixed point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub account: String,

    #[serde(rename = "tokenAddress")]
    pub token_address: String,

    #[serde(rename = "demurragedTotalBalance", default)]
    pub demurraged_total_balance: Option<String>,
}

impl BalanceRecord {
    pub fn new(
        account: impl Into<String>,
        token_address: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            token_address: token_address.into(),
            demurraged_total_balance: Some(amount.into()),
        }
    }
}

pub fn load_trusts_csv<P: AsRef<Path>>(path: P) -> Result<Vec<TrustRecord>, IngestionError> {
    let records = read_csv(path.as_ref())?;
    info!("Loaded {} trust records from {}", records.len(), path.as_ref().display());
    Ok(records)
}

pub fn load_balances_csv<P: AsRef<Path>>(path: P) -> Result<Vec<BalanceRecord>, IngestionError> {
    let records = read_csv(path.as_ref())?;
    info!("Loaded {} balance records from {}", records.len(), path.as_ref().display());
    Ok(records)
}

fn read_csv<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, IngestionError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_columns_deserialize() {
        let data = "account,tokenAddress,demurragedTotalBalance\n\
                    0xAA,0xBB,1000000000000000000\n\
                    0xCC,0xDD,\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<BalanceRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].token_address, "0xBB");
        assert_eq!(rows[0].demurraged_total_balance.as_deref(), Some("1000000000000000000"));
        assert_eq!(rows[1].demurraged_total_balance, None);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let data = "truster\n0xAA\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Result<Vec<TrustRecord>, _> = reader.deserialize().collect();
        assert!(rows.is_err());
    }
}
