//! Discovery and stop dispatch across recorder instances on one host.
//!
//! Discovery enumerates every `streamcap-*.status` record in the shared
//! directory and filters to active ones. Stop dispatch flips the
//! `stop_requested` flag in the targeted record(s); the owning process does
//! the actual shutdown on its next self-poll tick.
//!
//! Records whose pid no longer exists are surfaced as stale rather than
//! auto-deleted: a reader cannot tell a crashed instance from one it lacks
//! permission to probe, so removal is an explicit `prune` operation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::record::StatusRecord;
use crate::store::{self, StatusStore, load_record};

/// One discovered record with its enumeration-time ordinal.
///
/// Ordinals are assigned per enumeration and never persisted; selecting by
/// ordinal is best-effort because a record can appear or vanish between the
/// listing and the stop request.
#[derive(Debug, Clone)]
pub struct RecordEntry {
    pub ordinal: usize,
    pub path: PathBuf,
    pub record: StatusRecord,
    /// The recorded pid still exists on this host.
    pub alive: bool,
}

/// How to select records for a stop request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopSelector {
    /// Ordinal from a just-produced enumeration (racy, best-effort).
    Ordinal(usize),
    /// Substring match against the monitored URL; may match several records.
    Url(String),
    /// Every active record on the host.
    All,
}

/// Acknowledgement that a stop flag was written for one record.
#[derive(Debug, Clone)]
pub struct StopReceipt {
    pub pid: u32,
    pub url: Option<String>,
}

/// Check whether a process id exists on this host.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    // A pid above i32::MAX cannot name a process; the cast would go
    // negative and kill(-1, 0) probes the whole process group.
    if pid > i32::MAX as u32 {
        return false;
    }
    // Signal 0 probes existence without delivering anything. EPERM means the
    // process exists but belongs to someone else.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    true
}

/// Enumerate all active records in `dir`, ordinals assigned in path order.
pub fn list_records(dir: &Path) -> crate::Result<Vec<RecordEntry>> {
    let mut entries: Vec<RecordEntry> = scan(dir)?
        .into_iter()
        .filter(|e| e.record.is_active())
        .collect();
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.ordinal = idx + 1;
    }
    Ok(entries)
}

/// Set `stop_requested` on every record matched by `selector`.
///
/// Stale records are skipped: there is no process left to observe the flag.
pub fn request_stop(dir: &Path, selector: &StopSelector) -> crate::Result<Vec<StopReceipt>> {
    let entries = list_records(dir)?;
    let mut receipts = Vec::new();

    for entry in &entries {
        if !matches(selector, entry) {
            continue;
        }
        if !entry.alive {
            warn!(
                pid = entry.record.pid,
                path = %entry.path.display(),
                "skipping stale record"
            );
            continue;
        }
        // Read-modify-write of the whole record; only the flag changes.
        let mut record = match load_record(&entry.path) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "record vanished mid-dispatch");
                continue;
            }
        };
        record.stop_requested = true;
        StatusStore::open(&entry.path).publish(&record)?;
        debug!(pid = record.pid, "stop flag written");
        receipts.push(StopReceipt {
            pid: record.pid,
            url: record.monitor_url,
        });
    }

    Ok(receipts)
}

/// Remove records whose owning process no longer exists. Returns the number
/// of files removed.
pub fn prune_stale(dir: &Path) -> crate::Result<usize> {
    let mut removed = 0;
    for entry in scan(dir)? {
        if entry.alive {
            continue;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                debug!(path = %entry.path.display(), pid = entry.record.pid, "pruned stale record");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %entry.path.display(), error = %e, "failed to prune record"),
        }
    }
    Ok(removed)
}

fn matches(selector: &StopSelector, entry: &RecordEntry) -> bool {
    match selector {
        StopSelector::Ordinal(n) => entry.ordinal == *n,
        StopSelector::Url(needle) => entry
            .record
            .monitor_url
            .as_deref()
            .is_some_and(|url| url.contains(needle.as_str())),
        StopSelector::All => true,
    }
}

/// Read every parseable record in `dir`, active or not. Unreadable files are
/// logged and skipped so one corrupt record cannot hide the rest.
fn scan(dir: &Path) -> crate::Result<Vec<RecordEntry>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(crate::StoreError::io(dir, e)),
    };

    let mut paths: Vec<PathBuf> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(store::FILE_PREFIX) && n.ends_with(store::FILE_SUFFIX))
        })
        .collect();
    paths.sort();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        match load_record(&path) {
            Ok(record) => {
                let alive = pid_alive(record.pid);
                entries.push(RecordEntry {
                    ordinal: 0,
                    path,
                    record,
                    alive,
                });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn publish_active(dir: &Path, pid: u32, url: &str) -> StatusStore {
        let store = StatusStore::create(dir);
        let mut record = StatusRecord::new(pid);
        record.is_monitoring = true;
        record.monitor_url = Some(url.to_string());
        store.publish(&record).unwrap();
        store
    }

    #[test]
    fn test_list_filters_inactive_records() {
        let dir = tempdir().unwrap();
        publish_active(dir.path(), std::process::id(), "https://a.example/1");

        let idle = StatusStore::create(dir.path());
        idle.publish(&StatusRecord::new(std::process::id())).unwrap();

        let entries = list_records(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ordinal, 1);
        assert!(entries[0].alive);
    }

    #[test]
    fn test_list_ordinals_are_sequential() {
        let dir = tempdir().unwrap();
        for i in 0..3 {
            publish_active(dir.path(), std::process::id(), &format!("https://a.example/{i}"));
        }
        let entries = list_records(dir.path()).unwrap();
        let ordinals: Vec<usize> = entries.iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
    }

    #[test]
    fn test_list_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(list_records(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_records(&missing).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_pid_alive_rejects_out_of_range_pid() {
        // Would cast negative and match every signalable process.
        assert!(!pid_alive(u32::MAX));
        assert!(!pid_alive(i32::MAX as u32 + 1));
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn test_dead_pid_is_stale() {
        let dir = tempdir().unwrap();
        publish_active(dir.path(), u32::MAX, "https://a.example/dead");
        let entries = list_records(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].alive);
    }

    #[test]
    fn test_stop_by_url_substring_flags_all_matches() {
        let dir = tempdir().unwrap();
        let a = publish_active(dir.path(), std::process::id(), "https://live.douyin.com/111");
        let b = publish_active(dir.path(), std::process::id(), "https://live.douyin.com/222");
        let c = publish_active(dir.path(), std::process::id(), "https://www.tiktok.com/@x/live");

        let receipts =
            request_stop(dir.path(), &StopSelector::Url("douyin".into())).unwrap();
        assert_eq!(receipts.len(), 2);

        assert!(a.load().unwrap().stop_requested);
        assert!(b.load().unwrap().stop_requested);
        assert!(!c.load().unwrap().stop_requested);
    }

    #[test]
    fn test_stop_preserves_other_fields() {
        let dir = tempdir().unwrap();
        let store = publish_active(dir.path(), std::process::id(), "https://a.example/1");
        let before = store.load().unwrap();

        request_stop(dir.path(), &StopSelector::All).unwrap();

        let after = store.load().unwrap();
        assert!(after.stop_requested);
        assert_eq!(after.pid, before.pid);
        assert_eq!(after.monitor_url, before.monitor_url);
        assert_eq!(after.is_monitoring, before.is_monitoring);
    }

    #[test]
    fn test_stop_by_ordinal() {
        let dir = tempdir().unwrap();
        publish_active(dir.path(), std::process::id(), "https://a.example/1");
        publish_active(dir.path(), std::process::id(), "https://a.example/2");

        let receipts = request_stop(dir.path(), &StopSelector::Ordinal(2)).unwrap();
        assert_eq!(receipts.len(), 1);

        let flagged: usize = list_records(dir.path())
            .unwrap()
            .iter()
            .filter(|e| e.record.stop_requested)
            .count();
        assert_eq!(flagged, 1);
    }

    #[test]
    fn test_stop_skips_stale_records() {
        let dir = tempdir().unwrap();
        publish_active(dir.path(), u32::MAX, "https://a.example/dead");
        let receipts = request_stop(dir.path(), &StopSelector::All).unwrap();
        assert!(receipts.is_empty());
    }

    #[test]
    fn test_prune_removes_only_stale() {
        let dir = tempdir().unwrap();
        let live = publish_active(dir.path(), std::process::id(), "https://a.example/live");
        publish_active(dir.path(), u32::MAX, "https://a.example/dead");

        let removed = prune_stale(dir.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(live.path().exists());
        assert_eq!(list_records(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_scan_skips_corrupt_record() {
        let dir = tempdir().unwrap();
        publish_active(dir.path(), std::process::id(), "https://a.example/1");
        fs::write(dir.path().join("streamcap-deadbeef.status"), b"{broken").unwrap();

        let entries = list_records(dir.path()).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
