//! Transfer ledger
//!
//! The ledger is the only persisted state of the protocol: an ordered list of
//! [`TransferRecord`]s, one per initiated send. Every operation re-reads the
//! whole collection from the store, applies its change and writes the whole
//! collection back. Writers inside one process are serialized by a lock;
//! separate processes sharing one store are not reconciled (single-writer).

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::commitment::Secret;

/// Default ledger file name for persistent storage
pub const LEDGER_FILENAME: &str = "wormhole-sends.json";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("ledger lock poisoned")]
    Poisoned,
    #[error("a record for burn address {0} already exists")]
    DuplicateBurnAddress(Address),
    #[error("no record for burn address {0}")]
    NotFound(Address),
    #[error("record {burn_address} cannot move from {from} to {to}")]
    InvalidTransition {
        burn_address: Address,
        from: TransferStatus,
        to: TransferStatus,
    },
}

/// Lifecycle position of a record, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransferStatus {
    /// Funding transfer not confirmed yet
    Pending,
    /// Funded, redeemable
    Ready,
    /// Redeemed
    Used,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransferStatus::Pending => "Pending",
            TransferStatus::Ready => "Ready",
            TransferStatus::Used => "Used",
        };
        f.write_str(label)
    }
}

/// One initiated Wormhole send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Destination of the eventual mint
    pub receiver: Address,
    /// Token base units
    #[serde(with = "decimal")]
    pub amount: U256,
    /// One-time address derived from `(receiver, secret)`
    pub burn_address: Address,
    pub secret: Secret,
    /// Funding transaction, empty until confirmed
    #[serde(with = "optional_hash")]
    pub transaction_hash: Option<B256>,
    pub used: bool,
}

impl TransferRecord {
    /// A record for a send whose funding transaction has not been sent yet
    pub fn pending(receiver: Address, amount: U256, burn_address: Address, secret: Secret) -> Self {
        Self {
            receiver,
            amount,
            burn_address,
            secret,
            transaction_hash: None,
            used: false,
        }
    }

    pub fn status(&self) -> TransferStatus {
        if self.used {
            TransferStatus::Used
        } else if self.transaction_hash.is_some() {
            TransferStatus::Ready
        } else {
            TransferStatus::Pending
        }
    }
}

/// Backing storage for the ledger. Reads and writes are whole-collection.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> Result<Vec<TransferRecord>, LedgerError>;
    fn store(&self, records: &[TransferRecord]) -> Result<(), LedgerError>;
}

/// JSON array on disk, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self) -> Result<Vec<TransferRecord>, LedgerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn store(&self, records: &[TransferRecord]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json_data = serde_json::to_string_pretty(records)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json_data.as_bytes()).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// In-process store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<TransferRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Vec<TransferRecord>, LedgerError> {
        Ok(self.records.lock().map_err(|_| LedgerError::Poisoned)?.clone())
    }

    fn store(&self, records: &[TransferRecord]) -> Result<(), LedgerError> {
        *self.records.lock().map_err(|_| LedgerError::Poisoned)? = records.to_vec();
        Ok(())
    }
}

/// The transfer ledger: lifecycle-aware operations over a [`LedgerStore`].
pub struct TransferLedger<S> {
    store: S,
    write_lock: Mutex<()>,
}

impl<S: LedgerStore> TransferLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read-modify-write under the writer lock. The closure sees the current
    /// persisted state; the store is only rewritten when it returns `Ok(true)`.
    fn transact<T>(
        &self,
        apply: impl FnOnce(&mut Vec<TransferRecord>) -> Result<(T, bool), LedgerError>,
    ) -> Result<T, LedgerError> {
        let _guard = self.write_lock.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut records = self.store.load()?;
        let (value, changed) = apply(&mut records)?;
        if changed {
            self.store.store(&records)?;
        }
        Ok(value)
    }

    /// Append a new record. Burn addresses are unique across the ledger.
    pub fn append(&self, record: TransferRecord) -> Result<(), LedgerError> {
        self.transact(|records| {
            if records.iter().any(|r| r.burn_address == record.burn_address) {
                return Err(LedgerError::DuplicateBurnAddress(record.burn_address));
            }
            debug!(burn_address = %record.burn_address, "appending transfer record");
            records.push(record);
            Ok(((), true))
        })
    }

    /// All records in insertion order
    pub fn list_all(&self) -> Result<Vec<TransferRecord>, LedgerError> {
        self.store.load()
    }

    pub fn find(&self, burn_address: &Address) -> Result<Option<TransferRecord>, LedgerError> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|r| r.burn_address == *burn_address))
    }

    /// Apply `mutator` to the first record matching `predicate` and persist.
    ///
    /// Returns the updated record, or `None` when nothing matched (in which
    /// case the store is not written).
    pub fn update_record<P, M>(&self, predicate: P, mutator: M) -> Result<Option<TransferRecord>, LedgerError>
    where
        P: Fn(&TransferRecord) -> bool,
        M: FnOnce(&mut TransferRecord) -> Result<(), LedgerError>,
    {
        self.transact(|records| match records.iter_mut().find(|r| predicate(r)) {
            Some(record) => {
                mutator(record)?;
                Ok((Some(record.clone()), true))
            }
            None => Ok((None, false)),
        })
    }

    pub fn update_by_burn_address<M>(&self, burn_address: &Address, mutator: M) -> Result<Option<TransferRecord>, LedgerError>
    where
        M: FnOnce(&mut TransferRecord) -> Result<(), LedgerError>,
    {
        self.update_record(|r| r.burn_address == *burn_address, mutator)
    }

    /// Remove and return the most recently appended record.
    pub fn remove_last(&self) -> Result<Option<TransferRecord>, LedgerError> {
        self.transact(|records| {
            let removed = records.pop();
            let changed = removed.is_some();
            Ok((removed, changed))
        })
    }

    /// Compensating rollback of a failed funding step.
    ///
    /// Removes the record for `burn_address` only while it is still Pending;
    /// a record that has a funding hash is never deleted.
    pub fn rollback_pending(&self, burn_address: &Address) -> Result<bool, LedgerError> {
        self.transact(|records| {
            let position = records.iter().position(|r| r.burn_address == *burn_address);
            match position {
                Some(index) if records[index].status() == TransferStatus::Pending => {
                    if index + 1 != records.len() {
                        warn!(%burn_address, "rolling back a pending record that is not the last entry");
                    }
                    records.remove(index);
                    Ok((true, true))
                }
                Some(index) => Err(LedgerError::InvalidTransition {
                    burn_address: *burn_address,
                    from: records[index].status(),
                    to: TransferStatus::Pending,
                }),
                None => Ok((false, false)),
            }
        })
    }

    /// Pending -> Ready
    pub fn mark_funded(&self, burn_address: &Address, transaction_hash: B256) -> Result<TransferRecord, LedgerError> {
        self.transition(burn_address, TransferStatus::Ready, |record| {
            record.transaction_hash = Some(transaction_hash);
        })
    }

    /// Ready -> Used
    pub fn mark_used(&self, burn_address: &Address) -> Result<TransferRecord, LedgerError> {
        self.transition(burn_address, TransferStatus::Used, |record| {
            record.used = true;
        })
    }

    fn transition(
        &self,
        burn_address: &Address,
        to: TransferStatus,
        apply: impl FnOnce(&mut TransferRecord),
    ) -> Result<TransferRecord, LedgerError> {
        let updated = self.update_by_burn_address(burn_address, |record| {
            let from = record.status();
            // Only single forward steps are legal.
            let legal = matches!(
                (from, to),
                (TransferStatus::Pending, TransferStatus::Ready)
                    | (TransferStatus::Ready, TransferStatus::Used)
            );
            if !legal {
                return Err(LedgerError::InvalidTransition {
                    burn_address: *burn_address,
                    from,
                    to,
                });
            }
            apply(record);
            Ok(())
        })?;
        updated.ok_or(LedgerError::NotFound(*burn_address))
    }
}

/// U256 as a base-10 string.
mod decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<U256>().map_err(serde::de::Error::custom)
    }
}

/// Optional transaction hash, stored as `""` while absent.
mod optional_hash {
    use alloy_primitives::B256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<B256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(hash) => serializer.collect_str(hash),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<B256>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<B256>().map(Some).map_err(serde::de::Error::custom)
    }
}
