// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing & Stash (C5): binds input type labels to the outputs that
//! consume them, fans batches out in order, and stashes the undelivered
//! remainder of a batch when an output fails partway through.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use shiplog_adapters::Sink;
use shiplog_config::TypeMatch;

struct Registration {
    name: String,
    type_match: TypeMatch,
    sink: Arc<dyn Sink>,
}

/// Maps an event's effective type to the outputs bound to receive it.
/// Built once at startup from every configured output's `type` match rule;
/// never mutated afterward.
pub struct RoutingTable {
    registrations: Vec<Registration>,
}

impl RoutingTable {
    pub fn new(outputs: Vec<(TypeMatch, Arc<dyn Sink>)>) -> Self {
        let registrations = outputs
            .into_iter()
            .map(|(type_match, sink)| Registration {
                name: sink.name().to_string(),
                type_match,
                sink,
            })
            .collect();
        Self { registrations }
    }

    fn bound(&self, event_type: &str) -> impl Iterator<Item = &Registration> {
        self.registrations.iter().filter(move |r| r.type_match.matches(event_type))
    }

    pub fn has_route(&self, event_type: &str) -> bool {
        self.bound(event_type).next().is_some()
    }
}

struct StashedBatch {
    output: String,
    sink: Arc<dyn Sink>,
    lines: VecDeque<Value>,
}

/// Per-type queue of batches an output could not fully accept (spec.md
/// §4.5). While a type's entry is non-empty, the scheduler suspends reads
/// for inputs of that type.
#[derive(Default)]
pub struct Stash {
    by_type: HashMap<String, Vec<StashedBatch>>,
}

impl Stash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stashed(&self, event_type: &str) -> bool {
        self.by_type.get(event_type).is_some_and(|batches| !batches.is_empty())
    }

    pub fn has_any(&self) -> bool {
        self.by_type.values().any(|batches| !batches.is_empty())
    }

    fn push(&mut self, input_type: &str, output: &str, sink: Arc<dyn Sink>, lines: Vec<Value>) {
        let bytes: usize = lines.iter().map(|v| v.to_string().len()).sum();
        tracing::warn!(
            r#type = input_type,
            output,
            count = lines.len(),
            bytes,
            "stashing batch after output failure"
        );
        self.by_type.entry(input_type.to_string()).or_default().push(StashedBatch {
            output: output.to_string(),
            sink,
            lines: lines.into(),
        });
    }

    /// Drains every stashed type's pending batches once, in insertion
    /// order. A batch that fails again is put back at the head of its
    /// type's list and draining of that type halts until the next tick;
    /// batches behind it are left untouched this tick.
    pub async fn drain(&mut self) {
        let types: Vec<String> = self.by_type.keys().cloned().collect();
        for event_type in types {
            self.drain_type(&event_type).await;
        }
    }

    async fn drain_type(&mut self, event_type: &str) {
        let Some(batches) = self.by_type.remove(event_type) else {
            return;
        };
        let mut remaining = Vec::new();
        let mut halted = false;
        for mut batch in batches {
            if halted {
                remaining.push(batch);
                continue;
            }
            while let Some(line) = batch.lines.pop_front() {
                if batch.sink.push(&line).await.is_err() {
                    batch.lines.push_front(line);
                    halted = true;
                    break;
                }
            }
            if !batch.lines.is_empty() {
                remaining.push(batch);
            }
        }
        if !remaining.is_empty() {
            self.by_type.insert(event_type.to_string(), remaining);
        }
    }
}

/// Dispatches one encoded batch of lines sharing `effective_type` to every
/// output bound to it. On the first failure from a given output the
/// remaining suffix is stashed under `input_type` (the owning input's own
/// type label, which may differ from `effective_type` only under
/// `json_event`); every other bound output still receives the full batch.
/// Returns `false` if no output is bound to `effective_type` at all, so
/// the caller can warn once per tick.
pub async fn dispatch_batch(
    routing: &RoutingTable,
    stash: &mut Stash,
    input_type: &str,
    effective_type: &str,
    lines: &[Value],
) -> bool {
    let bound: Vec<(String, Arc<dyn Sink>)> = routing
        .bound(effective_type)
        .map(|r| (r.name.clone(), r.sink.clone()))
        .collect();
    if bound.is_empty() {
        return false;
    }

    for (name, sink) in bound {
        for (i, line) in lines.iter().enumerate() {
            if sink.push(line).await.is_err() {
                stash.push(input_type, &name, sink.clone(), lines[i..].to_vec());
                break;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shiplog_adapters::FakeSink;

    fn table_with(sinks: Vec<(&str, TypeMatch)>) -> (RoutingTable, Vec<Arc<FakeSink>>) {
        let mut fakes = Vec::new();
        let mut outputs = Vec::new();
        for (name, type_match) in sinks {
            let fake = Arc::new(FakeSink::new(name));
            fakes.push(fake.clone());
            outputs.push((type_match, fake as Arc<dyn Sink>));
        }
        (RoutingTable::new(outputs), fakes)
    }

    #[tokio::test]
    async fn wildcard_output_receives_every_type() {
        let (table, fakes) = table_with(vec![("out#0", TypeMatch::Wildcard)]);
        let mut stash = Stash::new();
        dispatch_batch(&table, &mut stash, "a", "a", &[json!({"@type": "a"})]).await;
        dispatch_batch(&table, &mut stash, "b", "b", &[json!({"@type": "b"})]).await;
        assert_eq!(fakes[0].pushed().len(), 2);
    }

    #[tokio::test]
    async fn failure_stashes_remaining_suffix_for_that_output_only() {
        let (table, fakes) = table_with(vec![
            ("r1", TypeMatch::List(vec!["syslog".into()])),
            ("r2", TypeMatch::List(vec!["syslog".into()])),
        ]);
        fakes[0].fail_next(1);
        let lines: Vec<Value> = (1..=5).map(|n| json!({"n": n})).collect();

        let routed = dispatch_batch(&table, &mut Stash::new(), "syslog", "syslog", &lines).await;
        assert!(routed);
        assert_eq!(fakes[1].pushed().len(), 5);
    }

    #[tokio::test]
    async fn unrouted_type_reports_no_route() {
        let (table, _fakes) = table_with(vec![("out#0", TypeMatch::List(vec!["known".into()]))]);
        let routed = dispatch_batch(&table, &mut Stash::new(), "unknown", "unknown", &[json!({})]).await;
        assert!(!routed);
        assert!(!table.has_route("unknown"));
        assert!(table.has_route("known"));
    }

    #[tokio::test]
    async fn stash_drains_in_order_once_output_recovers() {
        let (table, fakes) = table_with(vec![("r1", TypeMatch::List(vec!["syslog".into()]))]);
        fakes[0].fail_next(1);
        let lines: Vec<Value> = (1..=3).map(|n| json!({"n": n})).collect();

        let mut stash = Stash::new();
        dispatch_batch(&table, &mut stash, "syslog", "syslog", &lines).await;
        assert!(stash.is_stashed("syslog"));
        assert!(fakes[0].pushed().is_empty());

        stash.drain().await;
        assert!(!stash.is_stashed("syslog"));
        let pushed = fakes[0].pushed();
        assert_eq!(pushed.len(), 3);
        assert_eq!(pushed[0]["n"], 1);
        assert_eq!(pushed[2]["n"], 3);
    }
}
