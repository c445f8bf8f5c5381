//! Election bookkeeping: one candidate queue per subject.
//!
//! The elector is plain synchronous state behind a mutex. Promotion
//! side effects (handing the permit to a successor) are pushed through
//! a [`DelistSink`] after the lock is released, so a sink is free to
//! call back into the elector.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use socle_entity::ClientHandle;

use crate::contract::{CoordinationError, Permit};

/// Told whenever a delist leaves a new candidate at the head of a queue.
pub trait DelistSink: Send + Sync {
    fn promoted(&self, subject: &str, candidate: ClientHandle, permit: Permit);
}

/// Second attempt to wire a [`DelistSink`]; the slot is write-once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("a delist sink is already wired")]
pub struct SinkAlreadyWired;

struct Candidate {
    client: ClientHandle,
    permit: Permit,
}

#[derive(Default)]
struct Election {
    queue: VecDeque<Candidate>,
}

/// Queue-per-subject election state. The head of a queue holds the
/// permit; accepting confirms it; removing the head promotes the next
/// candidate in line.
pub struct LeaderElector {
    elections: Mutex<HashMap<String, Election>>,
    sink: OnceLock<Arc<dyn DelistSink>>,
    next_permit: AtomicU64,
}

impl LeaderElector {
    pub fn new() -> Self {
        Self {
            elections: Mutex::new(HashMap::new()),
            sink: OnceLock::new(),
            next_permit: AtomicU64::new(1),
        }
    }

    /// Wire the promotion sink. The slot accepts exactly one sink.
    pub fn set_delist_sink(&self, sink: Arc<dyn DelistSink>) -> Result<(), SinkAlreadyWired> {
        self.sink.set(sink).map_err(|_| SinkAlreadyWired)
    }

    fn mint_permit(&self) -> Permit {
        Permit::new(self.next_permit.fetch_add(1, Ordering::Relaxed))
    }

    /// Join the election for `subject`. Returns the minted permit only if
    /// the candidate landed at the head of a previously empty queue.
    pub fn enlist(&self, subject: &str, candidate: ClientHandle) -> Option<Permit> {
        let permit = self.mint_permit();
        let mut elections = self.elections.lock().expect("elections mutex poisoned");
        let election = elections.entry(subject.to_string()).or_default();
        let leads = election.queue.is_empty();
        election.queue.push_back(Candidate {
            client: candidate,
            permit,
        });
        leads.then_some(permit)
    }

    /// Confirm that `permit` still belongs to the head of `subject`'s
    /// queue. Accepting is idempotent while the holder stays at the head.
    pub fn accept(&self, subject: &str, permit: Permit) -> Result<(), CoordinationError> {
        let elections = self.elections.lock().expect("elections mutex poisoned");
        let Some(election) = elections.get(subject) else {
            return Err(CoordinationError::UnknownSubject {
                subject: subject.to_string(),
            });
        };
        match election.queue.front() {
            Some(head) if head.permit == permit => Ok(()),
            _ => Err(CoordinationError::StalePermit {
                subject: subject.to_string(),
            }),
        }
    }

    /// Withdraw `candidate` from `subject`'s election. Unknown subjects
    /// and absent candidates are no-ops. Removing the head hands the
    /// successor's permit to the sink.
    pub fn delist(&self, subject: &str, candidate: ClientHandle) {
        let promoted = {
            let mut elections = self.elections.lock().expect("elections mutex poisoned");
            let Some(election) = elections.get_mut(subject) else {
                return;
            };
            let successor = Self::withdraw(election, candidate);
            if election.queue.is_empty() {
                elections.remove(subject);
            }
            successor
        };
        if let Some((client, permit)) = promoted {
            self.notify_promoted(subject, client, permit);
        }
    }

    /// Withdraw `candidate` from every election it is queued in. This is
    /// the disconnect path; every vacated head seat triggers a promotion.
    pub fn delist_all(&self, candidate: ClientHandle) {
        let promotions = {
            let mut elections = self.elections.lock().expect("elections mutex poisoned");
            let mut promotions = Vec::new();
            elections.retain(|subject, election| {
                if let Some((client, permit)) = Self::withdraw(election, candidate) {
                    promotions.push((subject.clone(), client, permit));
                }
                !election.queue.is_empty()
            });
            promotions
        };
        for (subject, client, permit) in promotions {
            self.notify_promoted(&subject, client, permit);
        }
    }

    /// Current head of `subject`'s queue, if any.
    pub fn leader_of(&self, subject: &str) -> Option<ClientHandle> {
        self.elections
            .lock()
            .expect("elections mutex poisoned")
            .get(subject)
            .and_then(|election| election.queue.front().map(|head| head.client))
    }

    /// Drops every entry of `candidate`; returns the new head if the old
    /// head was among the removed.
    fn withdraw(
        election: &mut Election,
        candidate: ClientHandle,
    ) -> Option<(ClientHandle, Permit)> {
        let was_head = election.queue.front().map(|head| head.client) == Some(candidate);
        election.queue.retain(|entry| entry.client != candidate);
        if !was_head {
            return None;
        }
        election
            .queue
            .front()
            .map(|head| (head.client, head.permit))
    }

    fn notify_promoted(&self, subject: &str, client: ClientHandle, permit: Permit) {
        match self.sink.get() {
            Some(sink) => sink.promoted(subject, client, permit),
            None => log::debug!("elector: no delist sink, dropping promotion for {subject}"),
        }
    }
}

impl Default for LeaderElector {
    fn default() -> Self {
        Self::new()
    }
}
