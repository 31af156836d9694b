// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! shiplogd: the log-shipping agent daemon.
//!
//! Invocation per spec.md §6: `shiplogd <config-path> <pidfile-path>`.
//! Exits 0 on graceful shutdown, non-zero on configuration errors.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;

use shiplog_daemon::{env, pidfile::PidFile, supervisor};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("shiplogd {VERSION}");
    println!("Log-shipping agent daemon");
    println!();
    println!("USAGE:");
    println!("    shiplogd <config-path> <pidfile-path>");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

#[tokio::main]
async fn main() {
    // TLS-enabled inputs/outputs build rustls configs before any
    // connection is attempted; without a process-wide default
    // `CryptoProvider` those builder calls panic (rustls 0.23).
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("--version" | "-v" | "-V") => {
            println!("shiplogd {VERSION}");
            return;
        }
        Some("--help" | "-h" | "help") => {
            print_help();
            return;
        }
        _ => {}
    }

    let [config_path, pidfile_path] = args.as_slice() else {
        eprintln!("error: expected exactly two arguments");
        print_help();
        std::process::exit(1);
    };

    let config_path = PathBuf::from(config_path);
    let pidfile_path = PathBuf::from(pidfile_path);

    let config = match shiplog_config::load_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    let log_dir = env::log_dir(&pidfile_path);
    let _log_guard = match setup_logging(&log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to set up logging in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };

    let hostname = resolve_hostname(config.hostname.clone());

    let _pidfile = match PidFile::write(&pidfile_path) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to write pidfile");
            eprintln!("error: failed to write pidfile at {}: {e}", pidfile_path.display());
            std::process::exit(1);
        }
    };

    tracing::info!(config = %config_path.display(), hostname, "shiplogd starting");

    if let Err(e) = supervisor::run(config, hostname).await {
        tracing::error!(error = %e, "supervisor exited with error");
        eprintln!("error: {e}");
        std::process::exit(1);
    }

    tracing::info!("shiplogd stopped");
}

fn resolve_hostname(configured: Option<String>) -> String {
    configured.unwrap_or_else(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    })
}

fn setup_logging(
    log_dir: &std::path::Path,
) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::never(log_dir, "shiplogd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
