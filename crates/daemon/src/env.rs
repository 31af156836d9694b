// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Directory the non-blocking file logger writes into. Defaults to the
/// pidfile's parent directory so a single `--statedir`-less invocation
/// still has somewhere to put `shiplogd.log`; `SHIPLOG_LOG_DIR` overrides
/// it, matching the teacher's `OJ_STATE_DIR` convention.
pub fn log_dir(pidfile: &std::path::Path) -> PathBuf {
    if let Ok(dir) = std::env::var("SHIPLOG_LOG_DIR") {
        return PathBuf::from(dir);
    }
    pidfile
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Overrides the 15s graceful-shutdown reap window (spec.md §4.7), for
/// tests that don't want to wait out the real default.
pub fn shutdown_grace() -> std::time::Duration {
    std::env::var("SHIPLOG_SHUTDOWN_GRACE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(std::time::Duration::from_millis)
        .unwrap_or(std::time::Duration::from_secs(15))
}
