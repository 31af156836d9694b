// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeout wrapper shared by every sink and the socket listener.
//!
//! Every network operation in §4.3/§4.2 is bounded by a deadline; a single
//! push's send-then-receive pair shares one deadline rather than getting
//! one each, so this wraps a whole async operation, not an individual
//! `read`/`write` call.

use std::time::Duration;

use crate::error::SinkError;

/// Default per-push I/O timeout when a sink config does not override it.
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for accepting a new connection on the socket listener.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reading the auth line on a freshly accepted connection.
pub const AUTH_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `fut` under `timeout`, converting elapsed deadlines into
/// [`SinkError::Timeout`].
pub async fn run_with_timeout<F, T>(timeout: Duration, fut: F) -> Result<T, SinkError>
where
    F: std::future::Future<Output = Result<T, SinkError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(SinkError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_inner_result() {
        let out = run_with_timeout(Duration::from_millis(50), async { Ok::<_, SinkError>(7) })
            .await
            .unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn converts_elapsed_to_timeout_error() {
        let result = run_with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, SinkError>(())
        })
        .await;
        assert!(matches!(result, Err(SinkError::Timeout(_))));
    }
}
