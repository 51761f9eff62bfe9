//! Maildir delivery.
//!
//! `tmp/` and `new/` live on the same filesystem, so a rename makes
//! delivery atomic: readers only ever see complete messages in `new/`.
//! Any failure before the rename removes the temp file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::storage::sync_dir;
use crate::{Error, Result};

/// Collision counter for deliveries within the same second.
static DELIVERY_SEQ: AtomicU64 = AtomicU64::new(0);

/// Delivers `content` into the Maildir rooted at `mailbox`, creating
/// `tmp/`, `new/` and `cur/` as needed. Returns the final path under
/// `new/`.
pub fn deliver_mail(mailbox: &Path, content: &str) -> Result<PathBuf> {
    for component in mailbox.components() {
        match component {
            std::path::Component::ParentDir => {
                return Err(Error::storage(format!(
                    "mailbox path {} climbs out of its root",
                    mailbox.display()
                )))
            }
            std::path::Component::Normal(part) if part.to_string_lossy().contains('\0') => {
                return Err(Error::storage("NUL byte in mailbox path".to_string()))
            }
            _ => {}
        }
    }
    let tmp_dir = mailbox.join("tmp");
    let new_dir = mailbox.join("new");
    fs::create_dir_all(&tmp_dir)?;
    fs::create_dir_all(&new_dir)?;
    fs::create_dir_all(mailbox.join("cur"))?;

    let name = unique_name(&tmp_dir, &new_dir);
    let tmp_path = tmp_dir.join(&name);
    let new_path = new_dir.join(&name);

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
    if let Err(e) = fs::rename(&tmp_path, &new_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }
    sync_dir(&new_dir);
    log::debug!("delivered mail to {}", new_path.display());
    Ok(new_path)
}

/// `<seconds>.<pid>.<hostname>`, with a numeric suffix when a delivery
/// in the same second already claimed the name.
fn unique_name(tmp_dir: &Path, new_dir: &Path) -> String {
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let pid = std::process::id();
    let host = gethostname::gethostname()
        .to_string_lossy()
        .replace(['/', ':'], "_");

    let base = format!("{seconds}.{pid}.{host}");
    if !tmp_dir.join(&base).exists() && !new_dir.join(&base).exists() {
        return base;
    }
    loop {
        let seq = DELIVERY_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{seconds}.{pid}.{host}.{seq}");
        if !tmp_dir.join(&name).exists() && !new_dir.join(&name).exists() {
            return name;
        }
    }
}
