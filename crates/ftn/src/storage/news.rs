//! News spool delivery.
//!
//! Articles live under `<root>/<group with dots as separators>/<n>`;
//! the `active` index at the spool root maps each group to its article
//! range. Concurrent writers serialize on a per-group lock file, and
//! both the article and the index are written via temp + rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::storage::{sync_dir, validate_component};
use crate::{Error, Result};

const LOCK_NAME: &str = ".lock";
const LOCK_WAIT: Duration = Duration::from_secs(5);
/// A lock older than this is a leftover from a crashed writer.
const LOCK_STALE: Duration = Duration::from_secs(60);

/// One `active` file entry: `<group> <last> <first> <status>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub group: String,
    pub last: u64,
    pub first: u64,
    pub status: char,
}

/// A news spool rooted at one directory.
#[derive(Debug, Clone)]
pub struct NewsSpool {
    root: PathBuf,
}

impl NewsSpool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        NewsSpool { root: root.into() }
    }

    /// Stores one article in `group`, assigning the next article
    /// number. Returns the article path and its number.
    pub fn store(&self, group: &str, content: &str) -> Result<(PathBuf, u64)> {
        let group_dir = self.group_dir(group)?;
        fs::create_dir_all(&group_dir)?;

        let _lock = GroupLock::acquire(&group_dir)?;

        let mut active = self.load_active()?;
        let number = {
            let entry = active
                .iter_mut()
                .find(|e| e.group == group);
            match entry {
                Some(entry) => {
                    entry.last += 1;
                    if entry.first == 0 {
                        entry.first = entry.last;
                    }
                    entry.last
                }
                None => {
                    active.push(ActiveEntry {
                        group: group.to_string(),
                        last: 1,
                        first: 1,
                        status: 'y',
                    });
                    1
                }
            }
        };

        let article_path = group_dir.join(number.to_string());
        let tmp_path = group_dir.join(format!(".{number}.tmp"));
        let write = || -> Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp_path, &article_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Io(e));
        }
        sync_dir(&group_dir);

        self.save_active(&active)?;
        log::debug!("posted article {number} to {group}");
        Ok((article_path, number))
    }

    /// The on-disk directory for a newsgroup: dots become separators.
    fn group_dir(&self, group: &str) -> Result<PathBuf> {
        let mut dir = self.root.clone();
        for part in group.split('.') {
            validate_component(part)?;
            dir.push(part);
        }
        Ok(dir)
    }

    pub fn active_path(&self) -> PathBuf {
        self.root.join("active")
    }

    /// Parses the `active` file; a missing file is an empty index.
    pub fn load_active(&self) -> Result<Vec<ActiveEntry>> {
        let content = match fs::read_to_string(self.active_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(Error::storage(format!("malformed active line {line:?}")));
            }
            entries.push(ActiveEntry {
                group: fields[0].to_string(),
                last: fields[1]
                    .parse()
                    .map_err(|_| Error::storage(format!("bad last in {line:?}")))?,
                first: fields[2]
                    .parse()
                    .map_err(|_| Error::storage(format!("bad first in {line:?}")))?,
                status: fields[3].chars().next().unwrap_or('y'),
            });
        }
        Ok(entries)
    }

    fn save_active(&self, entries: &[ActiveEntry]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let tmp = self.root.join("active.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            for entry in entries {
                writeln!(
                    file,
                    "{} {} {} {}",
                    entry.group, entry.last, entry.first, entry.status
                )?;
            }
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, self.active_path()) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

/// A per-group advisory lock file, created with `create_new` and
/// removed on drop. Stale locks from crashed writers are broken after
/// [`LOCK_STALE`].
struct GroupLock {
    path: PathBuf,
}

impl GroupLock {
    fn acquire(group_dir: &Path) -> Result<GroupLock> {
        let path = group_dir.join(LOCK_NAME);
        let deadline = Instant::now() + LOCK_WAIT;
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(GroupLock { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        log::warn!("breaking stale lock {}", path.display());
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::storage(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age > LOCK_STALE)
}

impl Drop for GroupLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_article_creates_group_and_active() {
        let dir = tempdir().unwrap();
        let spool = NewsSpool::new(dir.path());
        let (path, number) = spool.store("fido.ru.test", "article one").unwrap();

        assert_eq!(number, 1);
        assert_eq!(path, dir.path().join("fido/ru/test/1"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "article one");

        let active = spool.load_active().unwrap();
        assert_eq!(
            active,
            vec![ActiveEntry {
                group: "fido.ru.test".into(),
                last: 1,
                first: 1,
                status: 'y',
            }]
        );
    }

    #[test]
    fn article_numbers_increment() {
        let dir = tempdir().unwrap();
        let spool = NewsSpool::new(dir.path());
        spool.store("fido.a", "1").unwrap();
        spool.store("fido.a", "2").unwrap();
        let (_, third) = spool.store("fido.a", "3").unwrap();
        assert_eq!(third, 3);
        let active = spool.load_active().unwrap();
        assert_eq!(active[0].last, 3);
        assert_eq!(active[0].first, 1);
    }

    #[test]
    fn groups_are_independent() {
        let dir = tempdir().unwrap();
        let spool = NewsSpool::new(dir.path());
        spool.store("fido.a", "x").unwrap();
        spool.store("fido.b", "y").unwrap();
        let active = spool.load_active().unwrap();
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn hostile_group_is_rejected() {
        let dir = tempdir().unwrap();
        let spool = NewsSpool::new(dir.path());
        for group in ["..", "a..b", "a./b"] {
            assert!(spool.store(group, "x").is_err(), "{group:?}");
        }
    }

    #[test]
    fn lock_file_is_released() {
        let dir = tempdir().unwrap();
        let spool = NewsSpool::new(dir.path());
        spool.store("fido.a", "x").unwrap();
        assert!(!dir.path().join("fido/a").join(LOCK_NAME).exists());
    }

    #[test]
    fn contended_lock_blocks_second_writer() {
        let dir = tempdir().unwrap();
        let group_dir = dir.path().join("fido/a");
        fs::create_dir_all(&group_dir).unwrap();
        let lock = GroupLock::acquire(&group_dir).unwrap();
        // A concurrent acquire cannot get in until the first releases.
        let contender = std::thread::spawn({
            let group_dir = group_dir.clone();
            move || GroupLock::acquire(&group_dir).map(|_| ())
        });
        std::thread::sleep(Duration::from_millis(100));
        drop(lock);
        contender.join().unwrap().unwrap();
    }

    #[test]
    fn no_tmp_leftovers_after_store() {
        let dir = tempdir().unwrap();
        let spool = NewsSpool::new(dir.path());
        spool.store("fido.a", "x").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("fido/a"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
