// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expands a glob-pattern `path` into the set of files currently tailed
//! under one input block, re-scanning periodically to pick up files
//! created after startup.
//!
//! Resolution: a glob expands to its lexicographically sorted match set at
//! each re-scan; new matches are added as additional tailers starting at
//! `StartPosition::Beginning` (a file that appears after startup is
//! assumed to be new, not a rotation target), and matches that disappear
//! (deleted or rotated out of the pattern) are dropped along with their
//! tailer state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::TailError;
use crate::tailer::{FileTailer, StartPosition};

pub struct WatchSet {
    pattern: String,
    start_position: StartPosition,
    skip: Option<String>,
    grep: Option<String>,
    tailers: BTreeMap<PathBuf, FileTailer>,
}

impl WatchSet {
    pub fn new(
        pattern: impl Into<String>,
        start_position: StartPosition,
        skip: Option<String>,
        grep: Option<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            start_position,
            skip,
            grep,
            tailers: BTreeMap::new(),
        }
    }

    /// Re-scans the glob pattern, adding tailers for newly matched paths
    /// and dropping ones for paths that no longer match.
    pub fn rescan(&mut self) -> Result<(), TailError> {
        let matches: Vec<PathBuf> = glob::glob(&self.pattern)?.filter_map(Result::ok).collect();

        self.tailers.retain(|path, _| matches.contains(path));

        for path in matches {
            if self.tailers.contains_key(&path) {
                continue;
            }
            let tailer = FileTailer::new(
                &path,
                self.start_position,
                self.skip.as_deref(),
                self.grep.as_deref(),
            )?;
            self.tailers.insert(path, tailer);
        }
        Ok(())
    }

    pub fn tailers_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut FileTailer)> {
        self.tailers.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tailers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tailers.is_empty()
    }
}
