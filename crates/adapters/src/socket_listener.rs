// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented TCP listener for `input { socket { ... } }` blocks.
//!
//! Each accepted connection optionally performs a TLS handshake, then an
//! authentication handshake: the client sends one line, the server
//! compares it byte-for-byte against the configured `auth` string and
//! replies `"1\n"` (accepted) or `"0\n"` (rejected, connection closed).
//! Every line read after that is handed to the scheduler through a
//! bounded channel; if `response` is configured it is echoed back after
//! each line, used by clients that want a delivery acknowledgement.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

use crate::error::ListenerError;
use crate::timeout::{ACCEPT_TIMEOUT, AUTH_READ_TIMEOUT};

/// One line received over a socket input, alongside the path-equivalent
/// identity used in envelope `@source_path`.
#[derive(Debug, Clone)]
pub struct SocketLine {
    pub peer: String,
    pub line: String,
}

/// Runtime configuration for a single socket input.
pub struct SocketListenerConfig {
    pub port: u16,
    pub tls: Option<Arc<rustls::ServerConfig>>,
    pub auth: Option<String>,
    pub response: Option<String>,
}

/// Owns the bound listener and its accept-loop task. Dropping this value
/// aborts the accept loop and all in-flight connection handlers.
pub struct SocketSource {
    rx: mpsc::Receiver<SocketLine>,
    accept_task: tokio::task::JoinHandle<()>,
    local_port: u16,
}

impl SocketSource {
    pub async fn bind(config: SocketListenerConfig) -> Result<Self, ListenerError> {
        let addr = format!("0.0.0.0:{}", config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ListenerError::Bind { addr: addr.clone(), source })?;
        Self::from_tokio_listener(listener, config.tls, config.auth, config.response, config.port)
    }

    /// Builds a source from an already-bound standard-library listener,
    /// used by the supervisor (§4.7) to share one accepted-connections fd
    /// across a `workers`-group: the listener is bound once and `dup`'d
    /// (`TcpListener::try_clone`) to every worker, mirroring what a forked
    /// process would have inherited — see DESIGN.md's note on replacing
    /// fork-inheritance with an OS-thread-per-worker model.
    pub fn from_std(
        std_listener: std::net::TcpListener,
        tls: Option<Arc<rustls::ServerConfig>>,
        auth: Option<String>,
        response: Option<String>,
    ) -> Result<Self, ListenerError> {
        let fallback_port = std_listener.local_addr().map(|a| a.port()).unwrap_or(0);
        std_listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::Bind { addr: "(dup'd listener)".into(), source })?;
        let listener = TcpListener::from_std(std_listener)
            .map_err(|source| ListenerError::Bind { addr: "(dup'd listener)".into(), source })?;
        Self::from_tokio_listener(listener, tls, auth, response, fallback_port)
    }

    fn from_tokio_listener(
        listener: TcpListener,
        tls: Option<Arc<rustls::ServerConfig>>,
        auth: Option<String>,
        response: Option<String>,
        fallback_port: u16,
    ) -> Result<Self, ListenerError> {
        let local_port = listener.local_addr().map(|a| a.port()).unwrap_or(fallback_port);

        let (tx, rx) = mpsc::channel(1024);
        let acceptor = tls.map(TlsAcceptor::from);

        let accept_task = tokio::spawn(accept_loop(listener, acceptor, auth, response, tx));

        Ok(Self { rx, accept_task, local_port })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Drains up to `max` already-received lines without blocking.
    pub fn try_recv_batch(&mut self, max: usize) -> Vec<SocketLine> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.rx.try_recv() {
                Ok(line) => out.push(line),
                Err(_) => break,
            }
        }
        out
    }
}

impl Drop for SocketSource {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    auth: Option<String>,
    response: Option<String>,
    tx: mpsc::Sender<SocketLine>,
) {
    loop {
        let accepted = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await;
        let (stream, peer) = match accepted {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "socket input accept failed");
                continue;
            }
            Err(_elapsed) => continue,
        };

        let acceptor = acceptor.clone();
        let auth = auth.clone();
        let response = response.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let peer_addr = peer.to_string();
            let result = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => handle_connection(tls_stream, &peer_addr, auth, response, tx).await,
                    Err(e) => {
                        tracing::warn!(peer = %peer_addr, error = %e, "tls handshake failed");
                        Ok(())
                    }
                },
                None => handle_connection(stream, &peer_addr, auth, response, tx).await,
            };
            if let Err(e) = result {
                tracing::debug!(peer = %peer_addr, error = %e, "socket input connection ended");
            }
        });
    }
}

async fn handle_connection<S>(
    stream: S,
    peer: &str,
    auth: Option<String>,
    response: Option<String>,
    tx: mpsc::Sender<SocketLine>,
) -> Result<(), ListenerError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut reader = BufReader::new(stream);

    if let Some(expected) = auth {
        let mut line = String::new();
        let read = tokio::time::timeout(AUTH_READ_TIMEOUT, reader.read_line(&mut line)).await;
        let accepted = matches!(read, Ok(Ok(n)) if n > 0 && line.trim_end_matches(['\r', '\n']) == expected);
        reader
            .get_mut()
            .write_all(if accepted { b"1\n" } else { b"0\n" })
            .await?;
        if !accepted {
            return Ok(());
        }
    }

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if tx
            .send(SocketLine { peer: peer.to_string(), line })
            .await
            .is_err()
        {
            return Ok(());
        }
        if let Some(response) = &response {
            reader.get_mut().write_all(response.as_bytes()).await?;
            reader.get_mut().write_all(b"\n").await?;
        }
    }
}
