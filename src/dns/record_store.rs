//! Flat-file store for the authoritative host list
//!
//! The backing file holds one `name address` pair per line. Blank lines and
//! lines starting with `#` are ignored when reading and never written back.
//! Lines that do not split into exactly two tokens, or whose second token is
//! not an IPv4 address, are skipped and counted instead of failing the load.
//!
//! Writes go through [`StagedFile`]: the new content lands in a temporary file
//! next to the target and only replaces it on [`StagedFile::commit`].
//!
//! Writers in separate processes (the web server and the CLI) coordinate
//! through an advisory lock on `<store>.lock`, see [`RecordStore::lock`].

use std::fmt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde_derive::{Deserialize, Serialize};
use tempfile::NamedTempFile;

#[derive(Debug)]
pub enum StorageError {
    CreateDir { path: PathBuf, source: io::Error },
    Create { path: PathBuf, source: io::Error },
    Read { path: PathBuf, source: io::Error },
    Write { path: PathBuf, source: io::Error },
    Commit { path: PathBuf, source: io::Error },
    Lock { path: PathBuf, source: io::Error },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateDir { path, source } => {
                write!(f, "Failed to create directory {}: {}", path.display(), source)
            }
            StorageError::Create { path, source } => {
                write!(f, "Failed to create {}: {}", path.display(), source)
            }
            StorageError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            StorageError::Write { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
            StorageError::Commit { path, source } => {
                write!(f, "Failed to replace {}: {}", path.display(), source)
            }
            StorageError::Lock { path, source } => {
                write!(f, "Failed to lock {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::CreateDir { source, .. }
            | StorageError::Create { source, .. }
            | StorageError::Read { source, .. }
            | StorageError::Write { source, .. }
            | StorageError::Commit { source, .. }
            | StorageError::Lock { source, .. } => Some(source),
        }
    }
}

type Result<T> = std::result::Result<T, StorageError>;

/// A single host mapping
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub address: Ipv4Addr,
}

impl Record {
    pub fn new(name: &str, address: Ipv4Addr) -> Record {
        Record {
            name: name.to_string(),
            address,
        }
    }

    /// Parse one line of the store file. Returns `None` for anything that is
    /// not exactly `name address`.
    fn parse_line(line: &str) -> Option<Record> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let address = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let address = address.parse::<Ipv4Addr>().ok()?;
        Some(Record::new(name, address))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.address)
    }
}

/// A store line that did not parse as `name address`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the store file
    pub number: usize,
    pub content: String,
}

/// Insertion-ordered record list with unique names
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new() -> RecordSet {
        RecordSet {
            records: Vec::new(),
        }
    }

    /// Replace any record called `name` and append the new mapping at the end.
    pub fn upsert(self, name: &str, address: Ipv4Addr) -> RecordSet {
        let mut set = self.remove(name);
        set.records.push(Record::new(name, address));
        set
    }

    /// Drop the record called `name`. A missing name leaves the set unchanged.
    pub fn remove(mut self, name: &str) -> RecordSet {
        self.records.retain(|r| r.name != name);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store file representation, one `name address` line per record
    pub fn to_file_contents(&self) -> String {
        let mut output = String::new();
        for record in &self.records {
            output.push_str(&record.to_string());
            output.push('\n');
        }
        output
    }

    /// Parse store file contents, returning the set and the number of
    /// malformed lines that were skipped.
    pub fn parse(contents: &str) -> (RecordSet, usize) {
        let (set, skipped) = RecordSet::parse_with_skipped_lines(contents);
        (set, skipped.len())
    }

    /// Like [`RecordSet::parse`], but hands back the skipped lines themselves.
    pub fn parse_with_skipped_lines(contents: &str) -> (RecordSet, Vec<SkippedLine>) {
        let mut set = RecordSet::new();
        let mut skipped = Vec::new();

        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match Record::parse_line(line) {
                Some(record) => set.records.push(record),
                None => skipped.push(SkippedLine {
                    number: index + 1,
                    content: line.to_string(),
                }),
            }
        }

        (set, skipped)
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// New file content waiting to replace `target`
#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    temp: NamedTempFile,
}

impl StagedFile {
    /// Write `contents` into a temporary file beside `target`.
    pub fn stage(target: &Path, contents: &str) -> Result<StagedFile> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(|source| StorageError::Create {
            path: target.to_path_buf(),
            source,
        })?;

        let write_err = |source| StorageError::Write {
            path: target.to_path_buf(),
            source,
        };
        temp.write_all(contents.as_bytes()).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        if let Some(perms) = target_permissions(target) {
            fs::set_permissions(temp.path(), perms).map_err(write_err)?;
        }

        Ok(StagedFile {
            target: target.to_path_buf(),
            temp,
        })
    }

    /// Atomically move the staged content over the target.
    pub fn commit(self) -> Result<()> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| StorageError::Commit {
                path: target.clone(),
                source: e.error,
            })?;
        Ok(())
    }
}

/// Keep the permissions of an existing target. Temp files are created 0600,
/// which would hide zone files from the name server.
fn target_permissions(target: &Path) -> Option<fs::Permissions> {
    if let Ok(meta) = fs::metadata(target) {
        return Some(meta.permissions());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(fs::Permissions::from_mode(0o644))
    }

    #[cfg(not(unix))]
    {
        None
    }
}

/// Create `path` (and its parent directories) as an empty file if missing.
pub fn ensure_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StorageError::Create {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(())
}

/// Exclusive hold on a store's lock file. Released when dropped.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// The persisted record list
#[derive(Clone, Debug)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> RecordStore {
        RecordStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        ensure_file(&self.path)
    }

    /// Sibling file used for cross-process write locking
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Block until no other process holds the store's write lock, then take
    /// it. Lock only around load, modify and commit.
    pub fn lock(&self) -> Result<StoreLock> {
        self.ensure_initialized()?;
        let path = self.lock_path();

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|source| StorageError::Create {
                path: path.clone(),
                source,
            })?;

        file.lock_exclusive().map_err(|source| StorageError::Lock {
            path: path.clone(),
            source,
        })?;

        Ok(StoreLock { file, path })
    }

    /// Load the record set. Each malformed line is logged with its content
    /// since the next write drops it.
    pub fn load(&self) -> Result<RecordSet> {
        let (records, skipped) = self.load_with_skipped_lines()?;
        for line in &skipped {
            log::warn!(
                "Skipping malformed line {} in {}: {:?}",
                line.number,
                self.path.display(),
                line.content
            );
        }
        Ok(records)
    }

    /// Load the record set along with the count of malformed lines dropped.
    pub fn load_with_skipped(&self) -> Result<(RecordSet, usize)> {
        let (records, skipped) = self.load_with_skipped_lines()?;
        Ok((records, skipped.len()))
    }

    pub fn load_with_skipped_lines(&self) -> Result<(RecordSet, Vec<SkippedLine>)> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(RecordSet::parse_with_skipped_lines(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok((RecordSet::new(), Vec::new())),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn stage(&self, records: &RecordSet) -> Result<StagedFile> {
        StagedFile::stage(&self.path, &records.to_file_contents())
    }

    pub fn save(&self, records: &RecordSet) -> Result<()> {
        self.ensure_initialized()?;
        self.stage(records)?.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_upsert_replaces_and_moves_to_end() {
        let set = RecordSet::new()
            .upsert("pc1", addr("192.168.0.10"))
            .upsert("pc2", addr("192.168.0.11"))
            .upsert("pc1", addr("192.168.0.20"));

        let names: Vec<_> = set.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["pc2", "pc1"]);
        assert_eq!(set.get("pc1").unwrap().address, addr("192.168.0.20"));
    }

    #[test]
    fn test_remove_missing_name_is_noop() {
        let set = RecordSet::new().upsert("pc1", addr("192.168.0.10"));
        let after = set.clone().remove("nope");
        assert_eq!(set, after);
    }

    #[test]
    fn test_parse_skips_comments_and_malformed_lines() {
        let contents = "# hosts\n\npc1 192.168.0.10\nbroken\ntoo many tokens here\nbad 999.1.1.1\n  pc2\t192.168.0.11  \n";
        let (set, skipped) = RecordSet::parse(contents);

        assert_eq!(skipped, 3);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("pc2").unwrap().address, addr("192.168.0.11"));
    }

    #[test]
    fn test_skipped_lines_keep_their_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("records.txt"));
        fs::write(
            store.path(),
            "# legacy
pc1 192.168.000.010
nas fe80::1
tv 192.168.0.50
",
        )
        .unwrap();

        let (set, skipped) = store.load_with_skipped_lines().unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(
            skipped,
            vec![
                SkippedLine {
                    number: 2,
                    content: "pc1 192.168.000.010".to_string(),
                },
                SkippedLine {
                    number: 3,
                    content: "nas fe80::1".to_string(),
                },
            ]
        );
        assert_eq!(store.load_with_skipped().unwrap().1, 2);
    }

    #[test]
    fn test_lock_is_exclusive_across_handles() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webdns").join("records.txt");
        let first = RecordStore::new(&path);
        let second = RecordStore::new(&path);

        let guard = first.lock().unwrap();
        assert!(first.lock_path().exists());

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let _guard = second.lock().unwrap();
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(guard);
        assert!(rx.recv_timeout(Duration::from_secs(10)).is_ok());
        waiter.join().unwrap();
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("absent.txt"));
        let (set, skipped) = store.load_with_skipped().unwrap();
        assert!(set.is_empty());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_save_load_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webdns").join("records.txt");
        let store = RecordStore::new(&path);

        let set = RecordSet::new()
            .upsert("pc1", addr("192.168.0.10"))
            .upsert("nas", addr("10.0.0.5"));
        store.save(&set).unwrap();
        let first = fs::read(&path).unwrap();

        store.save(&store.load().unwrap()).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, b"pc1 192.168.0.10\nnas 10.0.0.5\n".to_vec());
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("records.txt");
        let store = RecordStore::new(&path);

        store.ensure_initialized().unwrap();
        fs::write(&path, "pc1 192.168.0.10\n").unwrap();
        store.ensure_initialized().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "pc1 192.168.0.10\n");
    }

    #[test]
    fn test_uncommitted_stage_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.txt");
        fs::write(&path, "old 192.168.0.1\n").unwrap();

        let staged = StagedFile::stage(&path, "new 192.168.0.2\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old 192.168.0.1\n");
        drop(staged);

        assert_eq!(fs::read_to_string(&path).unwrap(), "old 192.168.0.1\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_commit_keeps_world_readable_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.home.local");
        StagedFile::stage(&path, "x\n").unwrap().commit().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
