//! The persistent duplicate detector.
//!
//! A mapping from normalized MSGID to first-seen time, held privately
//! by the tosser process. The on-disk form is one `<msgid>\t<unix-ts>`
//! line per entry, rewritten atomically on save.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ftn_dtyp::{msgid, Message};

use crate::{Error, Result};

/// The duplicate database.
#[derive(Debug)]
pub struct DupeDb {
    path: PathBuf,
    entries: HashMap<String, i64>,
    dirty: bool,
}

impl DupeDb {
    /// Opens the database; a missing file is an empty database, but an
    /// unreadable one is fatal (the tosser must not run blind).
    pub fn open(path: impl Into<PathBuf>) -> Result<DupeDb> {
        let path = path.into();
        let mut entries = HashMap::new();
        match fs::read_to_string(&path) {
            Ok(content) => {
                for (number, line) in content.lines().enumerate() {
                    let Some((key, timestamp)) = line.split_once('\t') else {
                        return Err(Error::Dedupe(format!(
                            "{}:{}: missing tab separator",
                            path.display(),
                            number + 1
                        )));
                    };
                    let timestamp = timestamp.trim().parse().map_err(|_| {
                        Error::Dedupe(format!(
                            "{}:{}: bad timestamp {timestamp:?}",
                            path.display(),
                            number + 1
                        ))
                    })?;
                    entries.insert(key.to_string(), timestamp);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(DupeDb {
            path,
            entries,
            dirty: false,
        })
    }

    /// Whether this message's normalized MSGID has been seen before.
    /// Messages without MSGID are never duplicates.
    pub fn is_duplicate(&self, message: &Message) -> bool {
        match &message.msgid {
            Some(id) => self.entries.contains_key(&id.normalized()),
            None => false,
        }
    }

    /// Records a message's MSGID with the given first-seen time.
    /// Messages without MSGID are not inserted.
    pub fn add(&mut self, message: &Message, now: i64) {
        if let Some(id) = &message.msgid {
            self.entries.insert(id.normalized(), now);
            self.dirty = true;
        }
    }

    /// Records a raw MSGID string (normalizing it first).
    pub fn add_raw(&mut self, raw: &str, now: i64) {
        self.entries.insert(msgid::normalize(raw), now);
        self.dirty = true;
    }

    /// Purges entries first seen before `cutoff`; returns how many.
    pub fn cleanup(&mut self, cutoff: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, seen| *seen >= cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the database out if it changed, via `.tmp` + rename so a
    /// crash never leaves a torn file.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        {
            let mut file = fs::File::create(&tmp)?;
            let mut lines: Vec<_> = self.entries.iter().collect();
            lines.sort();
            for (key, timestamp) in lines {
                writeln!(file, "{key}\t{timestamp}")?;
            }
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        self.dirty = false;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
