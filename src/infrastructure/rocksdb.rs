use crate::domain::decision::{Decision, DecisionType};
use crate::domain::escrow::Escrow;
use crate::domain::ports::{DecisionStore, EscrowStore};
use crate::domain::{AccountId, Epoch, EscrowId};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;

/// Column family for escrow records.
pub const CF_ESCROWS: &str = "escrows";
/// Column family for signer decisions.
pub const CF_DECISIONS: &str = "decisions";
/// Column family mapping `(deadline_epoch, escrow_id)` to nothing; the key
/// order is the deadline index.
pub const CF_DEADLINES: &str = "deadlines";

/// Persistent escrow and decision storage on RocksDB.
///
/// Keys are big-endian integers so lexicographic key order matches numeric
/// order, which is what makes the deadline column family a range scan.
/// Values are JSON. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

fn deadline_key(epoch: Epoch, id: EscrowId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&epoch.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn decision_key(escrow: EscrowId, account: AccountId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&escrow.to_be_bytes());
    key[8..].copy_from_slice(&account.to_be_bytes());
    key
}

impl RocksDbStore {
    /// Opens or creates the database with all required column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = vec![
            ColumnFamilyDescriptor::new(CF_ESCROWS, Options::default()),
            ColumnFamilyDescriptor::new(CF_DECISIONS, Options::default()),
            ColumnFamilyDescriptor::new(CF_DEADLINES, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            EscrowError::Storage(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }
}

#[async_trait]
impl EscrowStore for RocksDbStore {
    async fn create(&self, escrow: Escrow) -> Result<()> {
        let cf = self.cf(CF_ESCROWS)?;
        let key = escrow.id.to_be_bytes();
        if self.db.get_pinned_cf(&cf, key)?.is_some() {
            return Err(EscrowError::DuplicateId(escrow.id));
        }
        self.db.put_cf(&cf, key, serde_json::to_vec(&escrow)?)?;
        let deadlines = self.cf(CF_DEADLINES)?;
        self.db
            .put_cf(&deadlines, deadline_key(escrow.deadline_epoch, escrow.id), [])?;
        Ok(())
    }

    async fn get(&self, id: EscrowId) -> Result<Option<Escrow>> {
        let cf = self.cf(CF_ESCROWS)?;
        match self.db.get_cf(&cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, escrow: Escrow) -> Result<()> {
        let cf = self.cf(CF_ESCROWS)?;
        let key = escrow.id.to_be_bytes();
        if self.db.get_pinned_cf(&cf, key)?.is_none() {
            return Err(EscrowError::EscrowNotFound(escrow.id));
        }
        self.db.put_cf(&cf, key, serde_json::to_vec(&escrow)?)?;
        Ok(())
    }

    async fn remove(&self, id: EscrowId) -> Result<()> {
        let Some(escrow) = self.get(id).await? else {
            return Ok(());
        };
        let deadlines = self.cf(CF_DEADLINES)?;
        self.db
            .delete_cf(&deadlines, deadline_key(escrow.deadline_epoch, id))?;
        let cf = self.cf(CF_ESCROWS)?;
        self.db.delete_cf(&cf, id.to_be_bytes())?;
        Ok(())
    }

    async fn by_participant(&self, account: AccountId) -> Result<Vec<Escrow>> {
        // Reporting path; a full scan over the records CF is acceptable here.
        let cf = self.cf(CF_ESCROWS)?;
        let mut escrows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let escrow: Escrow = serde_json::from_slice(&value)?;
            if escrow.is_active() && escrow.involves(account) {
                escrows.push(escrow);
            }
        }
        Ok(escrows)
    }

    async fn all_active(&self) -> Result<Vec<Escrow>> {
        // Escrow ids are big-endian keys, so iteration order is id order.
        let cf = self.cf(CF_ESCROWS)?;
        let mut escrows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let escrow: Escrow = serde_json::from_slice(&value)?;
            if escrow.is_active() {
                escrows.push(escrow);
            }
        }
        Ok(escrows)
    }

    async fn maturing(&self, epoch: Epoch) -> Result<Vec<EscrowId>> {
        let deadlines = self.cf(CF_DEADLINES)?;
        // Collect the matured keys first; the iterator must not be held
        // across the record lookups.
        let mut candidates = Vec::new();
        for item in self.db.iterator_cf(deadlines, IteratorMode::Start) {
            let (key, _value) = item?;
            if key.len() != 16 {
                continue;
            }
            let entry_epoch = Epoch::from_be_bytes(key[..8].try_into().unwrap());
            if entry_epoch > epoch {
                break;
            }
            candidates.push(EscrowId::from_be_bytes(key[8..].try_into().unwrap()));
        }

        let mut ids = Vec::new();
        for id in candidates {
            if self.get(id).await?.is_some_and(|e| e.is_active()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl DecisionStore for RocksDbStore {
    async fn record(
        &self,
        escrow: EscrowId,
        account: AccountId,
        decision: DecisionType,
    ) -> Result<()> {
        let cf = self.cf(CF_DECISIONS)?;
        self.db
            .put_cf(&cf, decision_key(escrow, account), serde_json::to_vec(&decision)?)?;
        Ok(())
    }

    async fn decisions(&self, escrow: EscrowId) -> Result<Vec<Decision>> {
        let cf = self.cf(CF_DECISIONS)?;
        let prefix = escrow.to_be_bytes();
        let mut decisions = Vec::new();
        let iter = self.db.iterator_cf(
            cf,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );
        for item in iter {
            let (key, value) = item?;
            if key.len() != 16 || key[..8] != prefix {
                break;
            }
            decisions.push(Decision {
                account: AccountId::from_be_bytes(key[8..].try_into().unwrap()),
                decision: serde_json::from_slice(&value)?,
            });
        }
        Ok(decisions)
    }

    async fn clear(&self, escrow: EscrowId) -> Result<()> {
        let cf = self.cf(CF_DECISIONS)?;
        for decision in self.decisions(escrow).await? {
            self.db
                .delete_cf(&cf, decision_key(escrow, decision.account))?;
        }
        Ok(())
    }
}
