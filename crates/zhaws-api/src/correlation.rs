// ── Request correlation ──
//
// Every in-flight request owns one slot in `PendingRequests`, keyed by its
// message id. The slot holds a oneshot sender; whichever of result delivery,
// timeout, caller cancellation, or connection teardown removes the slot first
// decides the outcome. Removal from the map is the single point of
// arbitration, so a waiter is resolved at most once.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;

use crate::command::CommandKind;
use crate::error::Error;
use crate::response::{CommandResponse, ResponsePayload};

/// Ids wrap below 2^31 so they stay exact in any JSON number decoder.
pub const MESSAGE_ID_MODULUS: u32 = 0x8000_0000;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

type Outcome = Result<ResponsePayload, Error>;

struct Waiter {
    command: CommandKind,
    tx: oneshot::Sender<Outcome>,
}

pub(crate) struct PendingRequests {
    waiters: DashMap<u32, Waiter>,
    next_id: AtomicU32,
    modulus: u32,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::with_modulus(MESSAGE_ID_MODULUS)
    }

    pub(crate) fn with_modulus(modulus: u32) -> Self {
        Self {
            waiters: DashMap::new(),
            next_id: AtomicU32::new(0),
            modulus: modulus.max(1),
        }
    }

    /// Next id in sequence, wrapping to 0 at the modulus.
    fn next_candidate(&self) -> u32 {
        let modulus = self.modulus;
        match self
            .next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| {
                Some((id + 1) % modulus)
            }) {
            Ok(id) | Err(id) => id,
        }
    }

    /// Among any `in_flight + 1` consecutive ids at least one is free.
    fn attempts(&self) -> usize {
        let span = usize::try_from(self.modulus).unwrap_or(usize::MAX);
        self.waiters.len().saturating_add(1).min(span)
    }

    /// Allocate an id and register its waiter in one step.
    pub(crate) fn register(&self, command: CommandKind) -> Result<(u32, oneshot::Receiver<Outcome>), Error> {
        for _ in 0..self.attempts() {
            let id = self.next_candidate();
            if let Entry::Vacant(slot) = self.waiters.entry(id) {
                let (tx, rx) = oneshot::channel();
                slot.insert(Waiter { command, tx });
                return Ok((id, rx));
            }
        }
        Err(Error::IdsExhausted {
            in_flight: self.waiters.len(),
        })
    }

    /// Allocate an id that collides with no pending request, without
    /// registering a waiter.
    pub(crate) fn allocate_untracked(&self) -> Result<u32, Error> {
        for _ in 0..self.attempts() {
            let id = self.next_candidate();
            if !self.waiters.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(Error::IdsExhausted {
            in_flight: self.waiters.len(),
        })
    }

    /// Deliver a result. Returns `false` if nobody was waiting for it.
    pub(crate) fn resolve(&self, response: CommandResponse) -> bool {
        let Some((_, waiter)) = self.waiters.remove(&response.message_id) else {
            return false;
        };
        if waiter.command != response.command {
            tracing::warn!(
                message_id = response.message_id,
                sent = %waiter.command,
                echoed = %response.command,
                "result echoes a different command"
            );
        }
        let outcome = response.into_result().map_err(Error::from);
        // The receiver may already be gone if the caller was cancelled.
        let _ = waiter.tx.send(outcome);
        true
    }

    /// Fail one waiter with `error`.
    pub(crate) fn fail(&self, message_id: u32, error: Error) -> bool {
        match self.waiters.remove(&message_id) {
            Some((_, waiter)) => {
                let _ = waiter.tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every waiter with `Error::Cancelled`. Returns how many were failed.
    pub(crate) fn fail_all(&self) -> usize {
        let ids: Vec<u32> = self.waiters.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for message_id in ids {
            if let Some((_, waiter)) = self.waiters.remove(&message_id) {
                let _ = waiter.tx.send(Err(Error::Cancelled {
                    message_id,
                    command: waiter.command,
                }));
                failed += 1;
            }
        }
        failed
    }

    fn forget(&self, message_id: u32) -> bool {
        self.waiters.remove(&message_id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, message_id: u32) -> bool {
        self.waiters.contains_key(&message_id)
    }

    /// Await the outcome of a registered request, bounded by `timeout`.
    ///
    /// On timeout the waiter is removed and a `Timeout` error synthesized,
    /// unless a result was claimed in the same instant, in which case that
    /// result wins.
    pub(crate) async fn wait(
        &self,
        mut guard: PendingGuard<'_>,
        mut rx: oneshot::Receiver<Outcome>,
        command: CommandKind,
        timeout: Duration,
    ) -> Outcome {
        let message_id = guard.message_id;
        let outcome = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::Cancelled {
                message_id,
                command,
            }),
            Err(_) if self.forget(message_id) => {
                tracing::warn!(message_id, %command, "command timed out");
                Err(Error::Timeout {
                    message_id,
                    command,
                    timeout,
                })
            }
            // The deliverer already removed the slot; its send is imminent.
            Err(_) => rx.await.unwrap_or(Err(Error::Cancelled {
                message_id,
                command,
            })),
        };
        guard.disarm();
        outcome
    }
}

/// Removes a request's waiter if the awaiting future is dropped early.
pub(crate) struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    message_id: u32,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, message_id: u32) -> Self {
        Self {
            pending,
            message_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.pending.forget(self.message_id) {
            tracing::debug!(message_id = self.message_id, "request abandoned by caller");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::codes;
    use crate::response::ErrorDetail;

    #[test]
    fn ids_increase_and_wrap() {
        let pending = PendingRequests::with_modulus(4);
        let ids: Vec<u32> = (0..6).map(|_| pending.allocate_untracked().unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn pending_ids_are_never_reused() {
        let pending = PendingRequests::with_modulus(8);
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(pending.register(CommandKind::GetDevices).unwrap());
        }
        // Cycle the counter many times over while five ids stay pending.
        for _ in 0..10_000 {
            let (id, _rx) = pending.register(CommandKind::GetGroups).unwrap();
            assert!(!held.iter().any(|(held_id, _)| *held_id == id));
            assert!(pending.forget(id));
        }
        let unique: HashSet<u32> = held.iter().map(|(id, _)| *id).collect();
        assert_eq!(unique.len(), 5);
        assert_eq!(pending.len(), 5);
    }

    #[test]
    fn full_range_reports_exhaustion() {
        let pending = PendingRequests::with_modulus(3);
        let _held: Vec<_> = (0..3)
            .map(|_| pending.register(CommandKind::GetDevices).unwrap())
            .collect();
        assert!(matches!(
            pending.register(CommandKind::GetDevices),
            Err(Error::IdsExhausted { in_flight: 3 })
        ));
        assert!(pending.allocate_untracked().is_err());
    }

    #[test]
    fn result_resolves_exactly_once() {
        let pending = PendingRequests::new();
        let (id, mut rx) = pending.register(CommandKind::SwitchTurnOn).unwrap();
        let response = CommandResponse::success(id, CommandKind::SwitchTurnOn, ResponsePayload::Empty);
        assert!(pending.resolve(response.clone()));
        assert!(!pending.resolve(response));
        assert!(!pending.fail(id, Error::IdsExhausted { in_flight: 0 }));
        assert_eq!(rx.try_recv().unwrap().unwrap(), ResponsePayload::Empty);
    }

    #[test]
    fn failure_result_becomes_command_error() {
        let pending = PendingRequests::new();
        let (id, mut rx) = pending.register(CommandKind::LockLock).unwrap();
        pending.resolve(CommandResponse::failure(
            id,
            CommandKind::LockLock,
            ErrorDetail::new(codes::ENTITY_ACTION_FAILED, "jammed"),
        ));
        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.error_code(), Some(codes::ENTITY_ACTION_FAILED));
    }

    #[test]
    fn fail_all_cancels_every_waiter() {
        let pending = PendingRequests::new();
        let (_, mut a) = pending.register(CommandKind::GetDevices).unwrap();
        let (_, mut b) = pending.register(CommandKind::GetGroups).unwrap();
        assert_eq!(pending.fail_all(), 2);
        assert!(matches!(a.try_recv().unwrap(), Err(Error::Cancelled { .. })));
        assert!(matches!(
            b.try_recv().unwrap(),
            Err(Error::Cancelled {
                command: CommandKind::GetGroups,
                ..
            })
        ));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_the_waiter() {
        let pending = PendingRequests::new();
        let (id, rx) = pending.register(CommandKind::GetDevices).unwrap();
        let guard = PendingGuard::new(&pending, id);
        let outcome = pending
            .wait(guard, rx, CommandKind::GetDevices, Duration::from_secs(20))
            .await;
        assert!(matches!(outcome, Err(Error::Timeout { timeout, .. }) if timeout == Duration::from_secs(20)));
        assert!(!pending.contains(id));
    }

    #[test]
    fn dropped_guard_deregisters() {
        let pending = PendingRequests::new();
        let (id, _rx) = pending.register(CommandKind::GetDevices).unwrap();
        drop(PendingGuard::new(&pending, id));
        assert!(!pending.contains(id));
    }
}
