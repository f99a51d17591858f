//! On-disk layout of the summary cache: primary file, temporary file used
//! during promotion, and numbered backups (`.bak.1` is the newest).

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn temp_path(primary: &Path) -> PathBuf {
    with_suffix(primary, ".tmp")
}

pub fn backup_path(primary: &Path, generation: usize) -> PathBuf {
    with_suffix(primary, &format!(".bak.{}", generation))
}

pub fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// Write `bytes` to the temporary file next to `primary` and flush it to disk.
pub fn write_temp(primary: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    if let Some(parent) = primary.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(primary);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(tmp)
}

/// Shift existing backups up one generation, dropping the oldest, and copy
/// the current primary into `.bak.1`. The primary itself stays in place.
pub fn rotate_backups(primary: &Path, generations: usize) -> io::Result<()> {
    if generations == 0 || !primary.exists() {
        return Ok(());
    }

    let oldest = backup_path(primary, generations);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for generation in (1..generations).rev() {
        let from = backup_path(primary, generation);
        if from.exists() {
            fs::rename(&from, backup_path(primary, generation + 1))?;
        }
    }
    fs::copy(primary, backup_path(primary, 1))?;
    Ok(())
}

/// Atomically replace `primary` with `tmp`.
pub fn promote(tmp: &Path, primary: &Path) -> io::Result<()> {
    fs::rename(tmp, primary).map_err(|e| {
        let _ = fs::remove_file(tmp);
        e
    })
}
