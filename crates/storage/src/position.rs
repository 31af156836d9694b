// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable persistence for per-input tail position markers.
//!
//! Each marker is a fixed 29-byte ASCII file: `"%014d:%014d"` of
//! `(inode, byte_offset)`. Writes go through a temp file, fsync, atomic
//! rename, and directory fsync, mirroring the ordering used for durable
//! snapshot writes elsewhere in this codebase, but synchronously — at 29
//! bytes there is nothing worth moving to a background thread.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use shiplog_tail::TailState;

use crate::error::PositionError;

/// Marker files are exactly this many bytes: two 14-digit zero-padded
/// numbers separated by a colon.
const MARKER_LEN: usize = 29;

/// Abstracts the filesystem operations used to durably persist a marker,
/// so tests can inject a fake and assert on write/fsync/rename ordering.
pub trait PositionWriter: Send + Sync + 'static {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), PositionError>;
    fn fsync_file(&self, path: &Path) -> Result<(), PositionError>;
    fn rename(&self, from: &Path, to: &Path) -> Result<(), PositionError>;
    fn fsync_dir(&self, path: &Path) -> Result<(), PositionError>;
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, PositionError>;
}

#[derive(Clone, Default)]
pub struct FsPositionWriter;

impl PositionWriter for FsPositionWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> Result<(), PositionError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PositionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut file = File::create(path).map_err(|source| PositionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(data).map_err(|source| PositionError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn fsync_file(&self, path: &Path) -> Result<(), PositionError> {
        File::open(path)
            .and_then(|f| f.sync_all())
            .map_err(|source| PositionError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), PositionError> {
        std::fs::rename(from, to).map_err(|source| PositionError::Io {
            path: to.to_path_buf(),
            source,
        })
    }

    fn fsync_dir(&self, path: &Path) -> Result<(), PositionError> {
        File::open(path)
            .and_then(|f| f.sync_all())
            .map_err(|source| PositionError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, PositionError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PositionError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Durable store for one input's tail position marker.
pub struct PositionStore<W: PositionWriter = FsPositionWriter> {
    writer: W,
    path: PathBuf,
}

impl PositionStore<FsPositionWriter> {
    pub fn new(path: PathBuf) -> Self {
        Self::with_writer(FsPositionWriter, path)
    }
}

impl<W: PositionWriter> PositionStore<W> {
    pub fn with_writer(writer: W, path: PathBuf) -> Self {
        Self { writer, path }
    }

    /// Loads the persisted position, if a marker file exists.
    pub fn load(&self) -> Result<Option<TailState>, PositionError> {
        let Some(bytes) = self.writer.read(&self.path)? else {
            return Ok(None);
        };
        parse_marker(&bytes, &self.path).map(Some)
    }

    /// Persists `state`, forcing the write durable before returning.
    pub fn persist(&self, state: TailState) -> Result<(), PositionError> {
        let marker = format!("{:014}:{:014}", state.inode, state.offset);
        debug_assert_eq!(marker.len(), MARKER_LEN);

        let tmp_path = self.path.with_extension("tmp");
        self.writer.write_tmp(&tmp_path, marker.as_bytes())?;
        self.writer.fsync_file(&tmp_path)?;
        self.writer.rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            self.writer.fsync_dir(parent)?;
        }
        Ok(())
    }
}

fn parse_marker(bytes: &[u8], path: &Path) -> Result<TailState, PositionError> {
    let text = std::str::from_utf8(bytes).map_err(|_| PositionError::Malformed {
        path: path.to_path_buf(),
        reason: "not valid UTF-8".to_string(),
    })?;
    let (inode_str, offset_str) = text.split_once(':').ok_or_else(|| PositionError::Malformed {
        path: path.to_path_buf(),
        reason: "missing ':' separator".to_string(),
    })?;
    let inode: u64 = inode_str.trim().parse().map_err(|_| PositionError::Malformed {
        path: path.to_path_buf(),
        reason: "inode is not numeric".to_string(),
    })?;
    let offset: u64 = offset_str.trim().parse().map_err(|_| PositionError::Malformed {
        path: path.to_path_buf(),
        reason: "offset is not numeric".to_string(),
    })?;
    Ok(TailState { inode, offset })
}
