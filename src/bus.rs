// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! The Publication Bus (§4.7): in-process fan-out of `DispatchInfo` records.
//!
//! A transaction's dispatches are collected by the caller (the Materialiser
//! and the pipelines that drive it) into a `Vec<DispatchInfo>` for the
//! duration of the database transaction; `publish_batch` is only ever called
//! once that transaction has committed, and never on rollback. That
//! discipline — not any locking inside `Bus` itself — is what makes the
//! batch "backed by the caller's transaction" per §4.7.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::metrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchInfo {
    pub hash: String,
    pub chain_id: i32,
    pub height: i64,
    pub request_keys: Vec<String>,
    pub qualified_event_names: Vec<String>,
}

enum Subscriber {
    /// Forward every dispatch unconditionally.
    NewBlocks {
        sender: mpsc::UnboundedSender<DispatchInfo>,
    },
    /// Forward a dispatch only once `depth` further blocks have been
    /// observed on the same chain (confirmation depth).
    NewBlocksFromDepth {
        depth: i64,
        max_height_seen: HashMap<i32, i64>,
        pending: HashMap<i32, Vec<DispatchInfo>>,
        sender: mpsc::UnboundedSender<DispatchInfo>,
    },
    /// Forward dispatches carrying at least one of the given qualified
    /// event names (`module.name`).
    Events {
        names: Vec<String>,
        sender: mpsc::UnboundedSender<DispatchInfo>,
    },
    /// Forward the single dispatch carrying the given request key, then the
    /// subscription is naturally exhausted (the channel is simply dropped
    /// by the caller once it has what it wants).
    Transaction {
        request_key: String,
        sender: mpsc::UnboundedSender<DispatchInfo>,
    },
}

impl Subscriber {
    fn offer(&mut self, item: &DispatchInfo) {
        match self {
            Subscriber::NewBlocks { sender } => {
                let _ = sender.send(item.clone());
            }
            Subscriber::NewBlocksFromDepth {
                depth,
                max_height_seen,
                pending,
                sender,
            } => {
                let max_height = max_height_seen
                    .entry(item.chain_id)
                    .and_modify(|h| *h = (*h).max(item.height))
                    .or_insert(item.height);
                let max_height = *max_height;

                let chain_pending = pending.entry(item.chain_id).or_default();
                chain_pending.push(item.clone());
                chain_pending.sort_by_key(|d| d.height);

                let ready_count = chain_pending
                    .iter()
                    .take_while(|d| d.height <= max_height - *depth)
                    .count();
                for ready in chain_pending.drain(..ready_count) {
                    let _ = sender.send(ready);
                }
            }
            Subscriber::Events { names, sender } => {
                if item
                    .qualified_event_names
                    .iter()
                    .any(|n| names.contains(n))
                {
                    let _ = sender.send(item.clone());
                }
            }
            Subscriber::Transaction {
                request_key,
                sender,
            } => {
                if item.request_keys.iter().any(|k| k == request_key) {
                    let _ = sender.send(item.clone());
                }
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct Bus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl Bus {
    pub fn new() -> Self {
        Bus::default()
    }

    pub fn subscribe_new_blocks(&self) -> mpsc::UnboundedReceiver<DispatchInfo> {
        let (sender, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber::NewBlocks { sender });
        rx
    }

    pub fn subscribe_new_blocks_from_depth(&self, depth: i64) -> mpsc::UnboundedReceiver<DispatchInfo> {
        let (sender, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber::NewBlocksFromDepth {
                depth,
                max_height_seen: HashMap::new(),
                pending: HashMap::new(),
                sender,
            });
        rx
    }

    pub fn subscribe_events(&self, names: Vec<String>) -> mpsc::UnboundedReceiver<DispatchInfo> {
        let (sender, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber::Events { names, sender });
        rx
    }

    pub fn subscribe_transaction(&self, request_key: String) -> mpsc::UnboundedReceiver<DispatchInfo> {
        let (sender, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber::Transaction {
                request_key,
                sender,
            });
        rx
    }

    /// Push every item in `batch` to every matching subscriber. Call only
    /// after the owning transaction has committed.
    pub fn publish_batch(&self, batch: Vec<DispatchInfo>) {
        if batch.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.lock().unwrap();
        for item in &batch {
            metrics::DISPATCHES_PUBLISHED
                .with_label_values(&[&item.chain_id.to_string()])
                .inc();
            for sub in subscribers.iter_mut() {
                sub.offer(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch(hash: &str, chain_id: i32, height: i64) -> DispatchInfo {
        DispatchInfo {
            hash: hash.to_string(),
            chain_id,
            height,
            request_keys: vec![format!("rk-{hash}")],
            qualified_event_names: vec!["coin.TRANSFER".to_string()],
        }
    }

    #[test]
    fn new_blocks_receives_every_dispatch() {
        let bus = Bus::new();
        let mut rx = bus.subscribe_new_blocks();
        bus.publish_batch(vec![dispatch("H1", 0, 1), dispatch("H2", 0, 2)]);
        assert_eq!(rx.try_recv().unwrap().hash, "H1");
        assert_eq!(rx.try_recv().unwrap().hash, "H2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn depth_subscriber_waits_for_confirmations() {
        let bus = Bus::new();
        let mut rx = bus.subscribe_new_blocks_from_depth(2);

        bus.publish_batch(vec![dispatch("H1", 0, 10)]);
        assert!(rx.try_recv().is_err(), "not confirmed yet");

        bus.publish_batch(vec![dispatch("H2", 0, 11)]);
        assert!(rx.try_recv().is_err(), "still not confirmed");

        bus.publish_batch(vec![dispatch("H3", 0, 12)]);
        assert_eq!(rx.try_recv().unwrap().hash, "H1", "now has 2 confirmations");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn events_subscriber_filters_by_qualified_name() {
        let bus = Bus::new();
        let mut rx = bus.subscribe_events(vec!["coin.TRANSFER".to_string()]);
        let mut other = dispatch("H1", 0, 1);
        other.qualified_event_names = vec!["marmalade.MINT".to_string()];
        bus.publish_batch(vec![other, dispatch("H2", 0, 2)]);
        assert_eq!(rx.try_recv().unwrap().hash, "H2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn transaction_subscriber_filters_by_request_key() {
        let bus = Bus::new();
        let mut rx = bus.subscribe_transaction("rk-H2".to_string());
        bus.publish_batch(vec![dispatch("H1", 0, 1), dispatch("H2", 0, 2)]);
        assert_eq!(rx.try_recv().unwrap().hash, "H2");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn empty_batch_touches_no_subscriber_state() {
        let bus = Bus::new();
        let mut rx = bus.subscribe_new_blocks();
        bus.publish_batch(vec![]);
        assert!(rx.try_recv().is_err());
    }
}
