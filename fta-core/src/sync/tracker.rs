use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::CoreResult;

use super::{EntityKey, EntityKind, RemoteOp};

/// Whether the remote has caught up with the local copy of an entity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Synced,
    Pending,
    Failed,
}

/// A remote call registered with the tracker, carrying the sequence number
/// issued to each entity it touches.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncTicket {
    pub op: RemoteOp,
    pub sequences: Vec<(EntityKey, u64)>,
}

/// Remote calls that failed for one entity and still need to be replayed.
#[derive(Clone, Debug, PartialEq)]
pub struct FailureRecord {
    pub ops: Vec<RemoteOp>,
    pub attempts: u32,
    pub last_error: String,
}

/// What one acknowledgement did to the tracked entities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub synced: Vec<EntityKey>,
    pub stale: Vec<EntityKey>,
    pub failed: Vec<EntityKey>,
}

impl Completion {
    pub fn merge(&mut self, other: Completion) {
        self.synced.extend(other.synced);
        self.stale.extend(other.stale);
        self.failed.extend(other.failed);
    }
}

/// Per-entity sequencing of remote writes.
///
/// Every op gets a fresh sequence number for each entity it touches. An
/// acknowledgement only moves an entity's state if its sequence is still the
/// latest issued for that entity; older ones are discarded, unless they
/// landed after the latest call completed, in which case the latest call is
/// queued for retry.
#[derive(Debug, Default)]
pub struct SyncTracker {
    next_sequence: u64,
    latest: HashMap<EntityKey, (u64, RemoteOp)>,
    in_flight: HashMap<EntityKey, BTreeSet<u64>>,
    failures: BTreeMap<EntityKey, FailureRecord>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue sequence numbers for `ops` and mark their entities pending.
    pub fn begin(&mut self, ops: Vec<RemoteOp>) -> Vec<SyncTicket> {
        ops.into_iter()
            .map(|op| {
                let sequences = op
                    .entity_keys()
                    .into_iter()
                    .map(|key| {
                        self.next_sequence += 1;
                        let seq = self.next_sequence;
                        let entity_op = op.for_entity(&key).unwrap_or_else(|| op.clone());
                        self.latest.insert(key.clone(), (seq, entity_op));
                        self.in_flight.entry(key.clone()).or_default().insert(seq);
                        (key, seq)
                    })
                    .collect();
                SyncTicket { op, sequences }
            })
            .collect()
    }

    pub fn complete(
        &mut self,
        ticket: &SyncTicket,
        result: &CoreResult<()>,
        attempts: u32,
    ) -> Completion {
        let mut completion = Completion::default();

        for (key, seq) in &ticket.sequences {
            if let Some(pending) = self.in_flight.get_mut(key) {
                pending.remove(seq);
                if pending.is_empty() {
                    self.in_flight.remove(key);
                }
            }

            let entity_op = ticket
                .op
                .for_entity(key)
                .unwrap_or_else(|| ticket.op.clone());
            let latest = self.latest.get(key).cloned();
            let is_current = latest
                .as_ref()
                .map(|(latest_seq, _)| latest_seq == seq)
                .unwrap_or(true);

            match result {
                Ok(()) if is_current => {
                    self.clear_superseded(key, &entity_op);
                    if let RemoteOp::Delete {
                        kind: EntityKind::Node,
                        id,
                    } = &entity_op
                    {
                        self.clear_edges_of(id);
                    }
                    if !self.failures.contains_key(key) {
                        completion.synced.push(key.clone());
                    }
                }
                Ok(()) => {
                    // Once the newer call has completed, an older write landing
                    // now has overwritten it on the remote.
                    let overtaken = latest.as_ref().filter(|(latest_seq, latest_op)| {
                        !self.is_in_flight(key, *latest_seq) && latest_op.supersedes(&entity_op)
                    });
                    if let Some((latest_seq, latest_op)) = overtaken {
                        warn!(
                            "Older write to {} (seq {}) landed after seq {}, queueing it again",
                            key, seq, latest_seq
                        );
                        self.record_failure(
                            key,
                            latest_op.clone(),
                            0,
                            format!("overwritten by an older write (seq {})", seq),
                        );
                        completion.failed.push(key.clone());
                    } else {
                        debug!("Discarding stale acknowledgement for {} (seq {})", key, seq);
                        self.forget_failed_op(key, &entity_op);
                        completion.stale.push(key.clone());
                    }
                }
                Err(err) => {
                    let superseded = !is_current
                        && latest
                            .as_ref()
                            .map(|(_, latest_op)| latest_op.supersedes(&entity_op))
                            .unwrap_or(false);
                    if superseded {
                        debug!(
                            "Discarding stale failure for {} (seq {}): {}",
                            key, seq, err
                        );
                        completion.stale.push(key.clone());
                    } else {
                        warn!("Remote {} failed for {}: {}", entity_op.describe(), key, err);
                        self.record_failure(key, entity_op, attempts, err.to_string());
                        completion.failed.push(key.clone());
                    }
                }
            }
        }

        completion
    }

    pub fn state(&self, key: &EntityKey) -> SyncState {
        if self.in_flight.contains_key(key) {
            SyncState::Pending
        } else if self.failures.contains_key(key) {
            SyncState::Failed
        } else {
            SyncState::Synced
        }
    }

    pub fn is_unsynced(&self, key: &EntityKey) -> bool {
        self.state(key) != SyncState::Synced
    }

    /// Entities with a call in flight or a failed write, in key order.
    pub fn unsynced(&self) -> Vec<EntityKey> {
        let mut keys: BTreeSet<EntityKey> = self.in_flight.keys().cloned().collect();
        keys.extend(self.failures.keys().cloned());
        keys.into_iter().collect()
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    fn is_in_flight(&self, key: &EntityKey, seq: u64) -> bool {
        self.in_flight
            .get(key)
            .map(|pending| pending.contains(&seq))
            .unwrap_or(false)
    }

    pub fn failure(&self, key: &EntityKey) -> Option<&FailureRecord> {
        self.failures.get(key)
    }

    /// Failed calls in replay order: nodes before edges, deletions last.
    pub fn failed_ops(&self) -> Vec<RemoteOp> {
        let mut ops: Vec<RemoteOp> = self
            .failures
            .values()
            .flat_map(|record| record.ops.iter().cloned())
            .collect();
        ops.sort_by_key(RemoteOp::retry_rank);
        ops
    }

    fn record_failure(&mut self, key: &EntityKey, op: RemoteOp, attempts: u32, error: String) {
        let record = self
            .failures
            .entry(key.clone())
            .or_insert_with(|| FailureRecord {
                ops: Vec::new(),
                attempts: 0,
                last_error: String::new(),
            });
        record.ops.retain(|existing| !op.supersedes(existing));
        record.ops.push(op);
        record.attempts += attempts;
        record.last_error = error;
    }

    fn clear_superseded(&mut self, key: &EntityKey, op: &RemoteOp) {
        if let Some(record) = self.failures.get_mut(key) {
            record.ops.retain(|existing| !op.supersedes(existing));
            if record.ops.is_empty() {
                self.failures.remove(key);
            }
        }
    }

    // The call went through, so it no longer needs replaying.
    fn forget_failed_op(&mut self, key: &EntityKey, op: &RemoteOp) {
        if let Some(record) = self.failures.get_mut(key) {
            record.ops.retain(|existing| existing != op);
            if record.ops.is_empty() {
                self.failures.remove(key);
            }
        }
    }

    // Deleting a node on the remote takes its edges with it.
    fn clear_edges_of(&mut self, node_id: &str) {
        self.failures.retain(|key, record| {
            if key.kind != EntityKind::Edge {
                return true;
            }
            record.ops.retain(|op| !op.references_node(node_id));
            !record.ops.is_empty()
        });
    }
}
