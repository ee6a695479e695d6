//! Account state maintenance.
//!
//! Addresses are discovered by grouping the stored collections on their
//! address-bearing fields, then every distinct address is snapshotted at the
//! chain's latest block and upserted into the state collection.
//!
//! Snapshots always reflect `latest`, not the height at which an address was
//! first observed.

use alloy_primitives::{utils::format_units, U256};
use log::{debug, info};
use serde_json::Value;

use crate::{
    AccountFields, AggregateOptions, ChainAdapter, Document, DocumentStore, StateReport,
    SyncError, SyncResult, UpsertOutcome, ADDRESS_FIELD, ADDRESS_SOURCES, STATE_COLL,
};

/// Balance/code/storage of one address, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub address: String,
    pub hex_balance: String,
    pub balance: f64,
    pub code: String,
    pub storage: String,
}

impl AccountSnapshot {
    pub fn from_fields(address: &str, fields: AccountFields, decimals: u8) -> SyncResult<Self> {
        let balance = to_decimal_balance(&fields.balance, decimals)?;
        Ok(Self {
            address: address.to_string(),
            hex_balance: fields.balance,
            balance,
            code: fields.code,
            storage: fields.storage,
        })
    }

    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(ADDRESS_FIELD.to_string(), Value::String(self.address.clone()));
        document.insert("hexBalance".to_string(), Value::String(self.hex_balance.clone()));
        document.insert(
            "balance".to_string(),
            serde_json::Number::from_f64(self.balance)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        document.insert("code".to_string(), Value::String(self.code.clone()));
        document.insert("storage".to_string(), Value::String(self.storage.clone()));
        document
    }
}

/// Convert a hex quantity in base units (wei, sun) into whole units.
pub fn to_decimal_balance(hex_balance: &str, decimals: u8) -> SyncResult<f64> {
    let digits = hex_balance
        .strip_prefix("0x")
        .or_else(|| hex_balance.strip_prefix("0X"))
        .unwrap_or(hex_balance);
    let raw = if digits.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(digits, 16)
            .map_err(|e| SyncError::Rpc(format!("invalid balance {}: {}", hex_balance, e)))?
    };
    let formatted = format_units(raw, decimals)
        .map_err(|e| SyncError::Rpc(format!("invalid balance {}: {}", hex_balance, e)))?;
    formatted
        .parse::<f64>()
        .map_err(|e| SyncError::Rpc(format!("invalid balance {}: {}", formatted, e)))
}

pub struct StateMaintainer<'a, C: ?Sized, S: ?Sized> {
    chain: &'a C,
    store: &'a S,
    options: AggregateOptions,
}

impl<'a, C, S> StateMaintainer<'a, C, S>
where
    C: ChainAdapter + ?Sized,
    S: DocumentStore + ?Sized,
{
    pub fn new(chain: &'a C, store: &'a S, options: AggregateOptions) -> Self {
        Self {
            chain,
            store,
            options,
        }
    }

    /// Run the three address passes. Any fetch or write error aborts the run.
    pub async fn maintain(&self) -> SyncResult<StateReport> {
        let family = self.chain.family();
        let decimals = family.balance_decimals().ok_or_else(|| {
            SyncError::Unsupported(format!("account state is not available for {}", family))
        })?;

        // index may already exist or the store may refuse; neither matters
        if let Err(e) = self.store.create_index(STATE_COLL, ADDRESS_FIELD).await {
            debug!("ignoring index build error on {}: {}", STATE_COLL, e);
        }

        let mut report = StateReport::default();
        for source in ADDRESS_SOURCES {
            info!("start scan {}.{}", source.collection, source.field);
            let mut cursor = self
                .store
                .group_distinct(source.collection, source.field, self.options)
                .await?;
            while let Some(batch) = cursor.next_batch().await? {
                for value in batch {
                    let address = match value {
                        Value::String(address) if !address.is_empty() => address,
                        other => {
                            debug!("skipping group key {}", other);
                            continue;
                        }
                    };
                    self.refresh_account(&address, decimals).await?;
                    report.addresses += 1;
                }
            }
        }

        info!("account done: {} addresses refreshed", report.addresses);
        Ok(report)
    }

    /// Fetch one address and upsert its snapshot.
    pub async fn refresh_account(&self, address: &str, decimals: u8) -> SyncResult<UpsertOutcome> {
        let fields = self.chain.batch_get_account_fields(address).await?;
        let snapshot = AccountSnapshot::from_fields(address, fields, decimals)?;
        let outcome = self
            .store
            .upsert_one(
                STATE_COLL,
                ADDRESS_FIELD,
                &Value::String(address.to_string()),
                snapshot.to_document(),
            )
            .await?;
        debug!("updated account {} ({:?})", address, outcome);
        Ok(outcome)
    }
}
