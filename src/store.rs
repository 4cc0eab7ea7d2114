//! Upload batch persistence.
//!
//! A batch is created `Pending`, then moves exactly once to `Success` or
//! `Failed`. Records belong to one batch and are removed with it; a `Failed`
//! batch holds no records.

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::SalesRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    Success,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BatchStatus::Pending)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchStatus::Pending => "Pending",
            BatchStatus::Success => "Success",
            BatchStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub id: BatchId,
    pub file_name: String,
    pub status: BatchStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for UploadBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.file_name, self.status)
    }
}

pub trait BatchStore {
    fn create_batch(&mut self, file_name: &str) -> Result<BatchId>;

    fn append_record(&mut self, batch: BatchId, record: SalesRecord) -> Result<()>;

    /// Stores a whole batch's records; implementations may persist them in one
    /// write.
    fn append_records(&mut self, batch: BatchId, records: Vec<SalesRecord>) -> Result<()> {
        for record in records {
            self.append_record(batch, record)?;
        }
        Ok(())
    }

    /// Moves a pending batch to a terminal status. Marking a batch `Failed`
    /// discards any records already appended to it.
    fn mark_batch_status(
        &mut self,
        batch: BatchId,
        status: BatchStatus,
        error_message: Option<String>,
    ) -> Result<()>;

    /// Appends `records` and marks the batch `Success`. Implementations that
    /// persist should make both visible in a single write.
    fn complete_batch(&mut self, batch: BatchId, records: Vec<SalesRecord>) -> Result<()> {
        self.append_records(batch, records)?;
        self.mark_batch_status(batch, BatchStatus::Success, None)
    }

    fn records_for_batch(&self, batch: BatchId) -> Result<Vec<SalesRecord>>;

    /// The most recently created `Success` batch.
    fn last_successful_batch(&self) -> Result<Option<BatchId>>;

    /// Every batch, oldest first.
    fn batches(&self) -> Result<Vec<UploadBatch>>;

    /// Removes a batch and its records.
    fn delete_batch(&mut self, batch: BatchId) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    next_id: u64,
    batches: Vec<UploadBatch>,
    records: BTreeMap<BatchId, Vec<SalesRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn batch_mut(&mut self, batch: BatchId) -> Result<&mut UploadBatch> {
        self.batches
            .iter_mut()
            .find(|b| b.id == batch)
            .ok_or_else(|| anyhow!("Unknown batch {batch}"))
    }

    fn ensure_pending(&self, batch: BatchId) -> Result<()> {
        let entry = self
            .batches
            .iter()
            .find(|b| b.id == batch)
            .ok_or_else(|| anyhow!("Unknown batch {batch}"))?;
        if entry.status.is_terminal() {
            bail!("Batch {batch} is already {}", entry.status);
        }
        Ok(())
    }
}

impl BatchStore for MemoryStore {
    fn create_batch(&mut self, file_name: &str) -> Result<BatchId> {
        self.next_id += 1;
        let id = BatchId(self.next_id);
        self.batches.push(UploadBatch {
            id,
            file_name: file_name.to_string(),
            status: BatchStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    fn append_record(&mut self, batch: BatchId, record: SalesRecord) -> Result<()> {
        self.ensure_pending(batch)?;
        self.records.entry(batch).or_default().push(record);
        Ok(())
    }

    fn mark_batch_status(
        &mut self,
        batch: BatchId,
        status: BatchStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let entry = self.batch_mut(batch)?;
        if entry.status.is_terminal() {
            bail!(
                "Batch {batch} is already {}; cannot mark it {status}",
                entry.status
            );
        }
        entry.status = status;
        entry.error_message = error_message;
        if status == BatchStatus::Failed {
            self.records.remove(&batch);
        }
        Ok(())
    }

    fn complete_batch(&mut self, batch: BatchId, records: Vec<SalesRecord>) -> Result<()> {
        self.ensure_pending(batch)?;
        self.records.entry(batch).or_default().extend(records);
        self.mark_batch_status(batch, BatchStatus::Success, None)
    }

    fn records_for_batch(&self, batch: BatchId) -> Result<Vec<SalesRecord>> {
        Ok(self.records.get(&batch).cloned().unwrap_or_default())
    }

    fn last_successful_batch(&self) -> Result<Option<BatchId>> {
        Ok(self
            .batches
            .iter()
            .filter(|b| b.status == BatchStatus::Success)
            .max_by_key(|b| (b.created_at, b.id))
            .map(|b| b.id))
    }

    fn batches(&self) -> Result<Vec<UploadBatch>> {
        let mut batches = self.batches.clone();
        batches.sort_by_key(|b| (b.created_at, b.id));
        Ok(batches)
    }

    fn delete_batch(&mut self, batch: BatchId) -> Result<()> {
        let before = self.batches.len();
        self.batches.retain(|b| b.id != batch);
        if self.batches.len() == before {
            bail!("Unknown batch {batch}");
        }
        self.records.remove(&batch);
        Ok(())
    }
}

/// A [`MemoryStore`] mirrored to a pretty-printed JSON file after every
/// mutation.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let inner = if path.exists() {
            let file =
                File::open(path).with_context(|| format!("Opening store file {path:?}"))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Parsing store file {path:?}"))?
        } else {
            debug!("Store file {path:?} not found; starting empty");
            MemoryStore::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the store, writes the copy, and only then
    /// makes it current. A failed write leaves the in-memory state untouched.
    fn commit<T>(&mut self, change: impl FnOnce(&mut MemoryStore) -> Result<T>) -> Result<T> {
        let mut staged = self.inner.clone();
        let value = change(&mut staged)?;
        write_store(&self.path, &staged)?;
        self.inner = staged;
        Ok(value)
    }
}

/// Writes to a sibling temporary file and renames it over `path`, so readers
/// see either the previous or the new contents.
fn write_store(path: &Path, store: &MemoryStore) -> Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    let file =
        File::create(&staging).with_context(|| format!("Creating store file {staging:?}"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, store).context("Writing store JSON")?;
    writer
        .flush()
        .with_context(|| format!("Flushing store file {staging:?}"))?;
    fs::rename(&staging, path).with_context(|| format!("Replacing store file {path:?}"))
}

impl BatchStore for JsonFileStore {
    fn create_batch(&mut self, file_name: &str) -> Result<BatchId> {
        self.commit(|store| store.create_batch(file_name))
    }

    fn append_record(&mut self, batch: BatchId, record: SalesRecord) -> Result<()> {
        self.commit(|store| store.append_record(batch, record))
    }

    fn append_records(&mut self, batch: BatchId, records: Vec<SalesRecord>) -> Result<()> {
        self.commit(|store| store.append_records(batch, records))
    }

    fn mark_batch_status(
        &mut self,
        batch: BatchId,
        status: BatchStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        self.commit(|store| store.mark_batch_status(batch, status, error_message))
    }

    fn complete_batch(&mut self, batch: BatchId, records: Vec<SalesRecord>) -> Result<()> {
        self.commit(|store| store.complete_batch(batch, records))
    }

    fn records_for_batch(&self, batch: BatchId) -> Result<Vec<SalesRecord>> {
        self.inner.records_for_batch(batch)
    }

    fn last_successful_batch(&self) -> Result<Option<BatchId>> {
        self.inner.last_successful_batch()
    }

    fn batches(&self) -> Result<Vec<UploadBatch>> {
        self.inner.batches()
    }

    fn delete_batch(&mut self, batch: BatchId) -> Result<()> {
        self.commit(|store| store.delete_batch(batch))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    use super::*;

    fn record(product: &str, sales: i64) -> SalesRecord {
        SalesRecord::new(
            product,
            Decimal::from(sales),
            NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
        )
    }

    #[test]
    fn batch_lifecycle_is_terminal_after_success() -> Result<()> {
        let mut store = MemoryStore::new();
        let id = store.create_batch("sales.csv")?;
        assert_eq!(store.batches()?[0].status, BatchStatus::Pending);

        store.append_records(id, vec![record("Car", 1), record("Bike", 2)])?;
        store.mark_batch_status(id, BatchStatus::Success, None)?;

        assert!(store.mark_batch_status(id, BatchStatus::Failed, None).is_err());
        assert!(store.append_record(id, record("Late", 3)).is_err());
        assert_eq!(store.records_for_batch(id)?.len(), 2);
        Ok(())
    }

    #[test]
    fn last_successful_batch_ignores_pending_and_failed() -> Result<()> {
        let mut store = MemoryStore::new();
        assert_eq!(store.last_successful_batch()?, None);

        let first = store.create_batch("a.csv")?;
        store.mark_batch_status(first, BatchStatus::Success, None)?;
        let failed = store.create_batch("b.csv")?;
        store.mark_batch_status(failed, BatchStatus::Failed, Some("boom".into()))?;
        store.create_batch("c.csv")?;

        assert_eq!(store.last_successful_batch()?, Some(first));

        let second = store.create_batch("d.csv")?;
        store.mark_batch_status(second, BatchStatus::Success, None)?;
        assert_eq!(store.last_successful_batch()?, Some(second));
        Ok(())
    }

    #[test]
    fn last_successful_batch_orders_by_creation_time() -> Result<()> {
        let mut store = MemoryStore::new();
        let newer = store.create_batch("newer.csv")?;
        let older = store.create_batch("older.csv")?;
        store.mark_batch_status(newer, BatchStatus::Success, None)?;
        store.mark_batch_status(older, BatchStatus::Success, None)?;
        store.batch_mut(older)?.created_at = Utc::now() - chrono::Duration::days(1);

        assert_eq!(store.last_successful_batch()?, Some(newer));
        assert_eq!(store.batches()?[0].id, older);
        Ok(())
    }

    #[test]
    fn delete_batch_cascades_to_records() -> Result<()> {
        let mut store = MemoryStore::new();
        let id = store.create_batch("sales.csv")?;
        store.append_record(id, record("Car", 5))?;
        store.delete_batch(id)?;
        assert!(store.records_for_batch(id)?.is_empty());
        assert!(store.batches()?.is_empty());
        assert!(store.delete_batch(id).is_err());
        Ok(())
    }

    #[test]
    fn marking_failed_discards_appended_records() -> Result<()> {
        let mut store = MemoryStore::new();
        let id = store.create_batch("sales.csv")?;
        store.append_records(id, vec![record("Car", 1), record("Bike", 2)])?;
        store.mark_batch_status(id, BatchStatus::Failed, Some("disk full".into()))?;
        assert!(store.records_for_batch(id)?.is_empty());
        assert_eq!(store.batches()?[0].status, BatchStatus::Failed);
        Ok(())
    }

    #[test]
    fn complete_batch_stores_records_and_succeeds() -> Result<()> {
        let mut store = MemoryStore::new();
        let id = store.create_batch("sales.csv")?;
        store.complete_batch(id, vec![record("Car", 7)])?;
        assert_eq!(store.last_successful_batch()?, Some(id));
        assert_eq!(store.records_for_batch(id)?, vec![record("Car", 7)]);
        assert!(store.complete_batch(id, vec![record("Car", 8)]).is_err());
        assert_eq!(store.records_for_batch(id)?.len(), 1);
        Ok(())
    }

    #[test]
    fn json_store_keeps_memory_state_when_write_fails() -> Result<()> {
        let dir = tempdir()?;
        let store_dir = dir.path().join("store");
        fs::create_dir(&store_dir)?;
        let path = store_dir.join("store.json");

        let mut store = JsonFileStore::open(&path)?;
        let id = store.create_batch("sales.csv")?;
        fs::remove_dir_all(&store_dir)?;

        assert!(store.complete_batch(id, vec![record("Car", 5)]).is_err());
        let batches = store.batches()?;
        assert_eq!(batches[0].status, BatchStatus::Pending);
        assert!(store.records_for_batch(id)?.is_empty());
        assert_eq!(store.last_successful_batch()?, None);

        fs::create_dir(&store_dir)?;
        store.mark_batch_status(id, BatchStatus::Failed, Some("write failed".into()))?;
        let reopened = JsonFileStore::open(&path)?;
        assert_eq!(reopened.batches()?[0].status, BatchStatus::Failed);
        assert!(reopened.records_for_batch(id)?.is_empty());
        Ok(())
    }

    #[test]
    fn json_store_leaves_no_staging_file_behind() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("store.json");
        let mut store = JsonFileStore::open(&path)?;
        store.create_batch("sales.csv")?;
        assert!(path.exists());
        assert!(!dir.path().join("store.json.tmp").exists());
        Ok(())
    }

    #[test]
    fn json_store_survives_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("store.json");
        let id = {
            let mut store = JsonFileStore::open(&path)?;
            let id = store.create_batch("sales.xlsx")?;
            store.append_records(id, vec![record("Car", 500)])?;
            store.mark_batch_status(id, BatchStatus::Success, None)?;
            id
        };

        let reopened = JsonFileStore::open(&path)?;
        assert_eq!(reopened.last_successful_batch()?, Some(id));
        assert_eq!(reopened.records_for_batch(id)?, vec![record("Car", 500)]);
        assert_eq!(reopened.batches()?[0].file_name, "sales.xlsx");
        Ok(())
    }
}
