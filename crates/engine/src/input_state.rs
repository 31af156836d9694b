// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wraps each configured input's polymorphic backing (a single file
//! tailer, a glob-expanded watch set, or a socket listener) behind one
//! `pull` contract, and layers on the permanently-missing-file retirement
//! signal spec.md §4.1 describes as `pull` returning `null`.

use std::path::PathBuf;

use shiplog_adapters::{SocketListenerConfig, SocketSource};
use shiplog_config::{FileInput, SocketInput, StartPosition as ConfigStartPosition};
use shiplog_tail::{FileTailer, StartPosition, TailState, TailedLine, WatchSet};

use crate::encoder::CompiledInput;
use crate::error::EngineError;

/// Consecutive pulls that find the tracked path outright missing before a
/// `remove_on_errors` input is retired. At the default 500 ms poll this
/// approximates the ~20-pull / ~10s rotation grace window spec.md §4.1
/// gives a single file handle before it gives up waiting for the path to
/// come back.
const MISSING_FILE_GRACE_TICKS: u32 = 20;

/// One line read from any backing, not yet wrapped in an envelope.
pub struct RawLine {
    pub source_path: String,
    pub line: String,
}

enum Backing {
    File {
        tailer: FileTailer,
        path: PathBuf,
        missing_ticks: u32,
    },
    Glob {
        set: WatchSet,
    },
    Socket {
        source: SocketSource,
    },
}

/// One scheduled input: its compiled encoding properties, scheduling
/// bookkeeping, and polymorphic backing.
pub struct InputState {
    pub compiled: CompiledInput,
    pub remove_on_errors: bool,
    pub save_position: bool,
    /// Wall-clock millis at which this input is next eligible to be
    /// pulled again; advanced by the scheduler after an empty pull.
    pub next_tick_millis: i64,
    backing: Backing,
    retired: bool,
}

impl InputState {
    pub fn for_file(file: &FileInput, compiled: CompiledInput) -> Result<Self, EngineError> {
        let tailer = FileTailer::new(
            &file.path,
            to_tail_start(file.start_position),
            file.skip.as_deref(),
            file.grep.as_deref(),
        )?;
        Ok(Self {
            compiled,
            remove_on_errors: file.remove_on_errors,
            save_position: file.save_position,
            next_tick_millis: 0,
            backing: Backing::File {
                tailer,
                path: PathBuf::from(&file.path),
                missing_ticks: 0,
            },
            retired: false,
        })
    }

    /// Builds the meta-input for a glob-pattern file path. Spec.md §3
    /// models each glob match as its own input descriptor with
    /// `remove_on_errors=true`; this implementation instead bundles every
    /// current match under one [`WatchSet`] and relies on its periodic
    /// rescan to drop files that disappear from the pattern, which is a
    /// coarser (rescan-interval-grained, not pull-grained) retirement
    /// signal than the per-file grace window — see DESIGN.md.
    pub fn for_glob(file: &FileInput, compiled: CompiledInput) -> Result<Self, EngineError> {
        let mut set = WatchSet::new(
            file.path.clone(),
            to_tail_start(file.start_position),
            file.skip.clone(),
            file.grep.clone(),
        );
        set.rescan()?;
        Ok(Self {
            compiled,
            remove_on_errors: true,
            save_position: file.save_position,
            next_tick_millis: 0,
            backing: Backing::Glob { set },
            retired: false,
        })
    }

    pub async fn for_socket(socket: &SocketInput, compiled: CompiledInput) -> Result<Self, EngineError> {
        let tls = socket_tls(socket)?;
        let source = SocketSource::bind(SocketListenerConfig {
            port: socket.port,
            tls,
            auth: socket.auth.clone(),
            response: socket.response.clone(),
        })
        .await?;
        Ok(Self::from_socket_source(compiled, source))
    }

    /// Builds a socket input around a listener the supervisor already
    /// bound and `dup`'d for this worker (§4.7's per-`workers`-group fan
    /// out), instead of binding a fresh one.
    pub fn for_socket_with_std_listener(
        socket: &SocketInput,
        compiled: CompiledInput,
        std_listener: std::net::TcpListener,
    ) -> Result<Self, EngineError> {
        let tls = socket_tls(socket)?;
        let source =
            SocketSource::from_std(std_listener, tls, socket.auth.clone(), socket.response.clone())?;
        Ok(Self::from_socket_source(compiled, source))
    }

    fn from_socket_source(compiled: CompiledInput, source: SocketSource) -> Self {
        Self {
            compiled,
            remove_on_errors: false,
            save_position: false,
            next_tick_millis: 0,
            backing: Backing::Socket { source },
            retired: false,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn is_glob(&self) -> bool {
        matches!(self.backing, Backing::Glob { .. })
    }

    /// Re-scans a glob backing for newly matched or vanished paths. A
    /// no-op for file/socket backings.
    pub fn rescan_glob(&mut self) {
        if let Backing::Glob { set } = &mut self.backing {
            if let Err(e) = set.rescan() {
                tracing::warn!(error = %e, "glob rescan failed, keeping previous match set");
            }
        }
    }

    /// Pulls up to `max_lines` lines. Returns `None` to retire this input
    /// (only for `remove_on_errors` file inputs whose path has been gone
    /// for the missing-file grace window).
    pub fn pull(&mut self, max_lines: usize) -> Option<Vec<RawLine>> {
        match &mut self.backing {
            Backing::File { tailer, path, missing_ticks } => {
                let lines = match tailer.poll(max_lines) {
                    Ok(lines) => lines,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "tail read failed, retrying next tick");
                        Vec::new()
                    }
                };
                if lines.is_empty() {
                    if std::fs::metadata(&path).is_err() {
                        *missing_ticks += 1;
                    } else {
                        *missing_ticks = 0;
                    }
                    if self.remove_on_errors && *missing_ticks >= MISSING_FILE_GRACE_TICKS {
                        self.retired = true;
                        return None;
                    }
                } else {
                    *missing_ticks = 0;
                }
                Some(lines.into_iter().map(raw_from_tailed).collect())
            }
            Backing::Glob { set } => {
                let mut out = Vec::new();
                for (path, tailer) in set.tailers_mut() {
                    if out.len() >= max_lines {
                        break;
                    }
                    let remaining = max_lines - out.len();
                    match tailer.poll(remaining) {
                        Ok(lines) => out.extend(lines.into_iter().map(raw_from_tailed)),
                        Err(e) => tracing::warn!(path = %path.display(), error = %e, "glob-tailed read failed"),
                    }
                }
                Some(out)
            }
            Backing::Socket { source } => Some(
                source
                    .try_recv_batch(max_lines)
                    .into_iter()
                    .map(|l| RawLine { source_path: l.peer, line: l.line })
                    .collect(),
            ),
        }
    }

    /// Current resumable tail position, for periodic persistence. `None`
    /// for backings that don't have one (glob meta-inputs and sockets).
    pub fn position(&self) -> Option<TailState> {
        match &self.backing {
            Backing::File { tailer, .. } => tailer.state(),
            _ => None,
        }
    }

    pub fn resume_from(&mut self, state: TailState) -> Result<(), EngineError> {
        if let Backing::File { tailer, .. } = &mut self.backing {
            tailer.resume_from(state)?;
        }
        Ok(())
    }
}

fn socket_tls(socket: &SocketInput) -> Result<Option<std::sync::Arc<rustls::ServerConfig>>, EngineError> {
    if !socket.ssl {
        return Ok(None);
    }
    match (&socket.ssl_cert, &socket.ssl_key) {
        (Some(cert), Some(key)) => Ok(Some(shiplog_adapters::tls::load_server_config(cert, key)?)),
        _ => {
            tracing::warn!(port = socket.port, "ssl enabled without ssl_cert/ssl_key, listening in plaintext");
            Ok(None)
        }
    }
}

fn to_tail_start(start: ConfigStartPosition) -> StartPosition {
    match start {
        ConfigStartPosition::Beginning => StartPosition::Beginning,
        ConfigStartPosition::End => StartPosition::End,
    }
}

fn raw_from_tailed(t: TailedLine) -> RawLine {
    RawLine {
        source_path: t.source_path.display().to_string(),
        line: t.line,
    }
}
