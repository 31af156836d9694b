// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental, inode-tracked file tailer.
//!
//! The scheduling engine drives this by calling [`FileTailer::poll`] once
//! per tick with a line budget (`lines` in the config); the tailer never
//! blocks waiting for new data. Offsets are tracked per-inode so a file
//! rename-and-recreate (logrotate's default mode) is detected as rotation:
//! any bytes left in the old inode are drained first, then the new file is
//! picked up from its start.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::TailError;

/// Resumable tail position for a single input, persisted by
/// `shiplog-storage` between restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TailState {
    pub inode: u64,
    pub offset: u64,
}

/// A single line read from a tailed file, not yet wrapped in an envelope.
#[derive(Debug, Clone)]
pub struct TailedLine {
    pub source_path: PathBuf,
    pub line: String,
}

/// Where to start reading a file the tailer has never seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Beginning,
    End,
}

struct OpenFile {
    file: BufReader<File>,
    inode: u64,
    offset: u64,
}

/// Tails one configured file input, following rotation by inode.
pub struct FileTailer {
    path: PathBuf,
    start_position: StartPosition,
    skip: Option<Regex>,
    grep: Option<Regex>,
    current: Option<OpenFile>,
    /// Draining remainder of a rotated-away file, read to EOF before the
    /// new file is picked up.
    draining: Option<BufReader<File>>,
}

impl FileTailer {
    pub fn new(
        path: impl Into<PathBuf>,
        start_position: StartPosition,
        skip: Option<&str>,
        grep: Option<&str>,
    ) -> Result<Self, TailError> {
        Ok(Self {
            path: path.into(),
            start_position,
            skip: skip.map(Regex::new).transpose()?,
            grep: grep.map(Regex::new).transpose()?,
            current: None,
            draining: None,
        })
    }

    /// Resume from a previously persisted position instead of starting
    /// fresh per `start_position`.
    pub fn resume_from(&mut self, state: TailState) -> Result<(), TailError> {
        let file = File::open(&self.path).map_err(|source| TailError::Open {
            path: self.path.clone(),
            source,
        })?;
        let metadata = file.metadata().map_err(|source| TailError::Read {
            path: self.path.clone(),
            source,
        })?;
        if metadata.ino() != state.inode {
            // The file at this path is not the one the marker refers to;
            // treat as a fresh input rather than guessing at an offset
            // that belongs to a different inode.
            return Ok(());
        }
        let mut reader = BufReader::new(file);
        let offset = state.offset.min(metadata.len());
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| TailError::Read {
                path: self.path.clone(),
                source,
            })?;
        self.current = Some(OpenFile {
            file: reader,
            inode: state.inode,
            offset,
        });
        Ok(())
    }

    /// Current resumable position, for periodic persistence.
    pub fn state(&self) -> Option<TailState> {
        self.current.as_ref().map(|c| TailState {
            inode: c.inode,
            offset: c.offset,
        })
    }

    /// Reads up to `max_lines` complete lines, applying skip/grep filters,
    /// and returns them. A partial trailing line (no `\n` yet) is left
    /// unread for the next poll.
    pub fn poll(&mut self, max_lines: usize) -> Result<Vec<TailedLine>, TailError> {
        let mut out = Vec::new();

        if let Some(reader) = &mut self.draining {
            drain_complete_lines(reader, max_lines, &self.skip, &self.grep, &self.path, &mut out)?;
            if out.len() >= max_lines {
                return Ok(out);
            }
            self.draining = None;
        }

        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(_) => return Ok(out), // file missing this tick; try again next tick
        };
        let current_inode = metadata.ino();

        match self.current.as_mut() {
            Some(open) if open.inode == current_inode => {
                if metadata.len() < open.offset {
                    // Truncated in place (copytruncate-style rotation).
                    open.file
                        .seek(SeekFrom::Start(0))
                        .map_err(|source| TailError::Read {
                            path: self.path.clone(),
                            source,
                        })?;
                    open.offset = 0;
                }
            }
            Some(_) => {
                // Rotation: the path now refers to a different inode.
                // Drain whatever remains in the old file (still reachable
                // through the open handle even though the path was
                // reused) before switching over.
                if let Some(mut old) = self.current.take().map(|o| o.file) {
                    let remaining = max_lines.saturating_sub(out.len());
                    drain_complete_lines(&mut old, remaining, &self.skip, &self.grep, &self.path, &mut out)?;
                    self.draining = Some(old);
                }
                self.open_fresh(current_inode, &metadata)?;
            }
            None => {
                self.open_fresh(current_inode, &metadata)?;
            }
        }

        if out.len() < max_lines {
            if let Some(open) = &mut self.current {
                let remaining = max_lines - out.len();
                read_lines_into(open, remaining, &self.skip, &self.grep, &self.path, &mut out)?;
            }
        }

        Ok(out)
    }

    fn open_fresh(&mut self, inode: u64, metadata: &std::fs::Metadata) -> Result<(), TailError> {
        let file = File::open(&self.path).map_err(|source| TailError::Open {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let offset = match self.start_position {
            StartPosition::Beginning => 0,
            StartPosition::End => metadata.len(),
        };
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| TailError::Read {
                path: self.path.clone(),
                source,
            })?;
        self.current = Some(OpenFile {
            file: reader,
            inode,
            offset,
        });
        Ok(())
    }
}

fn read_lines_into(
    open: &mut OpenFile,
    max_lines: usize,
    skip: &Option<Regex>,
    grep: &Option<Regex>,
    path: &Path,
    out: &mut Vec<TailedLine>,
) -> Result<(), TailError> {
    let mut buf = String::new();
    let mut read_count = 0;
    while read_count < max_lines {
        buf.clear();
        let n = open.file.read_line(&mut buf).map_err(|source| TailError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 || !buf.ends_with('\n') {
            // EOF, or a partial line with no trailing newline yet: leave
            // it for the next poll by seeking back.
            if n > 0 {
                open.file
                    .seek(SeekFrom::Current(-(n as i64)))
                    .map_err(|source| TailError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
            }
            break;
        }
        open.offset += n as u64;
        read_count += 1;
        push_filtered(buf.trim_end_matches('\n'), skip, grep, path, out);
    }
    Ok(())
}

fn drain_complete_lines(
    reader: &mut BufReader<File>,
    max_lines: usize,
    skip: &Option<Regex>,
    grep: &Option<Regex>,
    path: &Path,
    out: &mut Vec<TailedLine>,
) -> Result<(), TailError> {
    let mut buf = String::new();
    let mut read_count = 0;
    while read_count < max_lines {
        buf.clear();
        let n = reader.read_line(&mut buf).map_err(|source| TailError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        read_count += 1;
        push_filtered(buf.trim_end_matches('\n'), skip, grep, path, out);
    }
    Ok(())
}

fn push_filtered(
    line: &str,
    skip: &Option<Regex>,
    grep: &Option<Regex>,
    path: &Path,
    out: &mut Vec<TailedLine>,
) {
    if let Some(skip) = skip {
        if skip.is_match(line) {
            return;
        }
    }
    if let Some(grep) = grep {
        if !grep.is_match(line) {
            return;
        }
    }
    out.push(TailedLine {
        source_path: path.to_path_buf(),
        line: line.to_string(),
    });
}
