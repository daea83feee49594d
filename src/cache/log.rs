use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::model::{Booking, User};

use super::{sort_by_date, CacheError, LocalCache};

/// One change to the cache, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheRecord {
    UserSaved(User),
    UsersCleared,
    BookingUpserted(Booking),
    BookingsCleared,
}

/// Encode a single record to [len][bincode][crc32] format.
fn encode_record(writer: &mut impl Write, record: &CacheRecord) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Append-only record log.
///
/// Format per entry: `[u32: len][bincode: CacheRecord][u32: crc32]`.
/// A torn or corrupt tail is dropped on replay and cut off on open, so new
/// records always follow the last valid one.
pub struct RecordLog {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl RecordLog {
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::recover(path).map(|(log, _)| log)
    }

    /// Open the log for appending and return its valid records. Bytes past
    /// the last valid record are truncated first.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<CacheRecord>)> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let (records, valid_len) = Self::scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            warn!(
                "cache {}: dropping {} bytes after the last valid record",
                path.display(),
                on_disk - valid_len
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        let log = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        };
        Ok((log, records))
    }

    /// Append records and fsync once for the batch.
    pub fn append(&mut self, records: &[CacheRecord]) -> io::Result<()> {
        for record in records {
            encode_record(&mut self.writer, record)?;
            self.appends_since_compact += 1;
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Rewrite the log as `records` via a temp file and rename.
    pub fn compact(&mut self, records: &[CacheRecord]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("log.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for record in records {
                encode_record(&mut writer, record)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Every valid record on disk, in order.
    pub fn replay(path: &Path) -> io::Result<Vec<CacheRecord>> {
        Self::scan(path).map(|(records, _)| records)
    }

    /// Valid records and the byte length they span.
    fn scan(path: &Path) -> io::Result<(Vec<CacheRecord>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }

            let mut crc_buf = [0u8; 4];
            match reader.read_exact(&mut crc_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break, // truncated
                Err(e) => return Err(e),
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }

            match bincode::deserialize::<CacheRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
            valid_len += 8 + len as u64;
        }

        Ok((records, valid_len))
    }
}

#[derive(Default)]
struct CacheState {
    users: HashMap<String, User>,
    bookings: HashMap<String, Booking>,
}

impl CacheState {
    fn apply(&mut self, record: CacheRecord) {
        match record {
            CacheRecord::UserSaved(user) => {
                self.users.insert(user.id.clone(), user);
            }
            CacheRecord::UsersCleared => self.users.clear(),
            CacheRecord::BookingUpserted(booking) => {
                self.bookings.insert(booking.id.clone(), booking);
            }
            CacheRecord::BookingsCleared => self.bookings.clear(),
        }
    }

    /// Minimal records that rebuild this state.
    fn snapshot(&self) -> Vec<CacheRecord> {
        let mut records: Vec<CacheRecord> = self
            .users
            .values()
            .cloned()
            .map(CacheRecord::UserSaved)
            .collect();
        let mut bookings: Vec<Booking> = self.bookings.values().cloned().collect();
        sort_by_date(&mut bookings);
        records.extend(bookings.into_iter().map(CacheRecord::BookingUpserted));
        records
    }
}

struct Inner {
    log: RecordLog,
    state: CacheState,
}

/// File-backed cache. State lives in memory and every change is appended to
/// the log before it is applied.
pub struct LogCache {
    inner: Mutex<Inner>,
    compact_threshold: u64,
}

impl LogCache {
    /// Replay the log at `path` (if any) and open it for appending.
    pub fn open(path: &Path, compact_threshold: u64) -> Result<Self, CacheError> {
        let (log, records) = RecordLog::recover(path)?;
        let replayed = records.len();
        let mut state = CacheState::default();
        for record in records {
            state.apply(record);
        }
        info!(
            "cache {}: replayed {replayed} records ({} users, {} bookings)",
            path.display(),
            state.users.len(),
            state.bookings.len()
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                log,
                state,
            }),
            compact_threshold,
        })
    }

    async fn commit(&self, records: Vec<CacheRecord>) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        inner.log.append(&records)?;
        for record in records {
            inner.state.apply(record);
        }
        if inner.log.appends_since_compact() >= self.compact_threshold {
            let snapshot = inner.state.snapshot();
            inner.log.compact(&snapshot)?;
            debug!("cache compacted to {} records", snapshot.len());
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for LogCache {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, CacheError> {
        Ok(self.inner.lock().await.state.users.get(user_id).cloned())
    }

    async fn last_user(&self) -> Result<Option<User>, CacheError> {
        Ok(self.inner.lock().await.state.users.values().next().cloned())
    }

    async fn save_user(&self, user: &User) -> Result<(), CacheError> {
        self.commit(vec![CacheRecord::UsersCleared, CacheRecord::UserSaved(user.clone())])
            .await
    }

    async fn upsert_booking(&self, booking: &Booking) -> Result<(), CacheError> {
        self.commit(vec![CacheRecord::BookingUpserted(booking.clone())]).await
    }

    async fn bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, CacheError> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Booking> = inner
            .state
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        sort_by_date(&mut out);
        Ok(out)
    }

    async fn clear_bookings(&self) -> Result<(), CacheError> {
        self.commit(vec![CacheRecord::BookingsCleared]).await
    }

    async fn clear_users(&self) -> Result<(), CacheError> {
        self.commit(vec![CacheRecord::UsersCleared]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::NaiveDate;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("courtside_test_cache");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn booking(id: &str, user: &str, day: u32, status: BookingStatus) -> Booking {
        let mut draft = DraftBooking::new(
            user,
            Facility::new("f1", "Court A", Category::Badminton, 2000),
            NaiveDate::from_ymd_opt(2025, 11, day).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            SlotRange::hours(10, 12),
            1,
            Contact::default(),
        );
        draft.id = id.into();
        draft.to_booking(status)
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.log");
        let records = vec![
            CacheRecord::UserSaved(User::guest("u1")),
            CacheRecord::BookingUpserted(booking("A", "u1", 10, BookingStatus::Confirmed)),
        ];
        {
            let mut log = RecordLog::open(&path).unwrap();
            log.append(&records).unwrap();
            assert_eq!(log.appends_since_compact(), 2);
        }
        assert_eq!(RecordLog::replay(&path).unwrap(), records);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.log");
        assert!(RecordLog::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn.log");
        let record = CacheRecord::UserSaved(User::guest("u1"));
        {
            let mut log = RecordLog::open(&path).unwrap();
            log.append(std::slice::from_ref(&record)).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }
        assert_eq!(RecordLog::replay(&path).unwrap(), vec![record.clone()]);

        // writes after a torn tail must survive the next open
        let second = CacheRecord::UserSaved(User::guest("u2"));
        {
            let mut log = RecordLog::open(&path).unwrap();
            log.append(std::slice::from_ref(&second)).unwrap();
        }
        assert_eq!(RecordLog::replay(&path).unwrap(), vec![record, second]);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn cache_keeps_writes_made_after_a_crash() {
        let path = tmp_path("crash_then_write.log");
        {
            let cache = LogCache::open(&path, 1000).unwrap();
            cache.save_user(&User::guest("u1")).await.unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }
        {
            let cache = LogCache::open(&path, 1000).unwrap();
            cache.save_user(&User::guest("u2")).await.unwrap();
        }
        let cache = LogCache::open(&path, 1000).unwrap();
        assert!(cache.get_user("u2").await.unwrap().is_some());
        assert!(cache.get_user("u1").await.unwrap().is_none());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.log");
        {
            let payload = bincode::serialize(&CacheRecord::BookingsCleared).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }
        assert!(RecordLog::replay(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn cache_survives_reopen() {
        let path = tmp_path("reopen.log");
        {
            let cache = LogCache::open(&path, 1000).unwrap();
            cache.save_user(&User::guest("u1")).await.unwrap();
            cache
                .upsert_booking(&booking("B", "u1", 14, BookingStatus::Confirmed))
                .await
                .unwrap();
            cache
                .upsert_booking(&booking("A", "u1", 10, BookingStatus::Pending))
                .await
                .unwrap();
            cache
                .upsert_booking(&booking("A", "u1", 10, BookingStatus::Cancelled))
                .await
                .unwrap();
            cache
                .upsert_booking(&booking("C", "u2", 12, BookingStatus::Confirmed))
                .await
                .unwrap();
        }

        let cache = LogCache::open(&path, 1000).unwrap();
        assert_eq!(cache.get_user("u1").await.unwrap().unwrap().name, "Guest");
        let mine = cache.bookings_for_user("u1").await.unwrap();
        let ids: Vec<_> = mine.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(mine[0].status, BookingStatus::Cancelled);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn save_user_replaces_previous_profile() {
        let path = tmp_path("single_user.log");
        let cache = LogCache::open(&path, 1000).unwrap();
        cache.save_user(&User::guest("u1")).await.unwrap();
        cache.save_user(&User::guest("u2")).await.unwrap();
        assert!(cache.get_user("u1").await.unwrap().is_none());
        assert!(cache.get_user("u2").await.unwrap().is_some());
        assert_eq!(cache.last_user().await.unwrap().unwrap().id, "u2");

        cache.clear_users().await.unwrap();
        assert!(cache.get_user("u2").await.unwrap().is_none());
        assert!(cache.last_user().await.unwrap().is_none());
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn compaction_shrinks_log_and_keeps_state() {
        let path = tmp_path("compact.log");
        {
            let cache = LogCache::open(&path, 10).unwrap();
            for i in 0..9 {
                let status = if i % 2 == 0 {
                    BookingStatus::Pending
                } else {
                    BookingStatus::Confirmed
                };
                cache.upsert_booking(&booking("A", "u1", 10, status)).await.unwrap();
            }
            // tenth append crosses the threshold
            cache
                .upsert_booking(&booking("A", "u1", 10, BookingStatus::Cancelled))
                .await
                .unwrap();
        }
        let records = RecordLog::replay(&path).unwrap();
        assert_eq!(records.len(), 1);

        let cache = LogCache::open(&path, 10).unwrap();
        let mine = cache.bookings_for_user("u1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, BookingStatus::Cancelled);
        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn clear_bookings_is_persisted() {
        let path = tmp_path("clear.log");
        {
            let cache = LogCache::open(&path, 1000).unwrap();
            cache
                .upsert_booking(&booking("A", "u1", 10, BookingStatus::Confirmed))
                .await
                .unwrap();
            cache.clear_bookings().await.unwrap();
        }
        let cache = LogCache::open(&path, 1000).unwrap();
        assert!(cache.bookings_for_user("u1").await.unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }
}
