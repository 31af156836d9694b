// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pidfile handling for the `<prog> <config> <pidfile>` CLI contract
//! (spec.md §6). Per spec.md §1, "the startup script and PID-file
//! mechanics" are an external collaborator this system touches only
//! through that interface — so beyond an `flock`-based guard against two
//! daemons racing to start against the same pidfile (mirrors the
//! teacher's lock-file startup check), no further pidfile conventions
//! (rotation, stale-PID detection, ...) are implemented; that belongs to
//! whatever launches `shiplogd`.

use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::SupervisorError;

pub struct PidFile {
    path: PathBuf,
    file: std::fs::File,
}

impl PidFile {
    /// Opens (without truncating) and exclusively locks `path`, then
    /// writes the current PID. An already-running daemon holding the
    /// lock causes this to fail rather than clobber its pidfile.
    pub fn write(path: &Path) -> Result<Self, SupervisorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SupervisorError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| SupervisorError::Io { path: path.to_path_buf(), source })?;

        file.try_lock_exclusive()
            .map_err(|source| SupervisorError::Io { path: path.to_path_buf(), source })?;

        file.set_len(0).map_err(|source| SupervisorError::Io { path: path.to_path_buf(), source })?;
        let mut file = file;
        writeln!(file, "{}", std::process::id())
            .map_err(|source| SupervisorError::Io { path: path.to_path_buf(), source })?;
        file.flush().map_err(|source| SupervisorError::Io { path: path.to_path_buf(), source })?;

        Ok(Self { path: path.to_path_buf(), file })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_current_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shiplogd.pid");
        let pidfile = PidFile::write(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(pidfile);
        assert!(!path.exists());
    }

    #[test]
    fn second_writer_is_rejected_while_first_holds_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shiplogd.pid");
        let _first = PidFile::write(&path).unwrap();
        assert!(PidFile::write(&path).is_err());
    }
}
