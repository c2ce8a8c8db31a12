use std::sync::Arc;

use tracing::debug;

use crate::errors::CoreResult;
use crate::sync::{RemoteStore, RetryPolicy, SyncTicket};

/// Result of sending one ticket's remote call.
#[derive(Debug)]
pub struct DispatchResult {
    pub ticket: SyncTicket,
    pub result: CoreResult<()>,
    pub attempts: u32,
}

/// Sends remote calls in order, retrying transient failures.
///
/// Cheap to clone, so concurrent callers can dispatch without holding the
/// edit session.
pub struct Reconciler<R: RemoteStore + ?Sized> {
    remote: Arc<R>,
    retry: RetryPolicy,
}

impl<R: RemoteStore + ?Sized> Clone for Reconciler<R> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            retry: self.retry.clone(),
        }
    }
}

impl<R: RemoteStore + ?Sized> Reconciler<R> {
    pub fn new(remote: Arc<R>, retry: RetryPolicy) -> Self {
        Self { remote, retry }
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Sends each ticket in order. A failure does not stop later tickets;
    /// every outcome is returned for the tracker.
    pub async fn dispatch(&self, tickets: Vec<SyncTicket>) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(tickets.len());
        for ticket in tickets {
            let label = ticket.op.describe();
            debug!("Dispatching {}", label);
            let (result, attempts) = {
                let op = &ticket.op;
                let remote = self.remote.as_ref();
                self.retry.run(&label, move || op.send(remote)).await
            };
            results.push(DispatchResult {
                ticket,
                result,
                attempts,
            });
        }
        results
    }
}
