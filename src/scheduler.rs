//! Per-session single-fire phase timers.
//!
//! The scheduler owns at most one outstanding timer per session; arming a
//! new one cancels the old one first. A fired signal carries the
//! `phase_number` it was armed for, and the engine discards signals whose
//! phase number no longer matches the session, the fence that makes the
//! cancel/fire race harmless. Deadlines are not exact; a few seconds of
//! tolerance is acceptable.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::SessionId;

/// Signals emitted by armed timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    /// Periodic countdown tick, broadcast to clients as the public `timer`
    /// event.
    Sync {
        session_id: SessionId,
        phase_number: u32,
        remaining_seconds: u64,
    },
    /// The phase deadline elapsed.
    Expired {
        session_id: SessionId,
        phase_number: u32,
    },
}

impl TimerSignal {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Sync { session_id, .. } | Self::Expired { session_id, .. } => *session_id,
        }
    }

    pub fn phase_number(&self) -> u32 {
        match self {
            Self::Sync { phase_number, .. } | Self::Expired { phase_number, .. } => *phase_number,
        }
    }
}

struct ArmedTimer {
    phase_number: u32,
    cancel: CancellationToken,
}

/// Single-fire timer map keyed by session.
pub struct PhaseScheduler {
    timers: DashMap<SessionId, ArmedTimer>,
    tx: mpsc::UnboundedSender<TimerSignal>,
    sync_interval: Duration,
}

impl PhaseScheduler {
    /// Build a scheduler and the receiver the engine drains signals from.
    pub fn new(sync_interval: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<TimerSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                timers: DashMap::new(),
                tx,
                sync_interval,
            }),
            rx,
        )
    }

    /// Arm the deadline for a phase, replacing (and cancelling) any prior
    /// timer for the session.
    pub fn arm(&self, session_id: SessionId, phase_number: u32, deadline: Duration) {
        let cancel = CancellationToken::new();
        if let Some(prev) = self.timers.insert(
            session_id,
            ArmedTimer {
                phase_number,
                cancel: cancel.clone(),
            },
        ) {
            prev.cancel.cancel();
        }

        tracing::debug!(%session_id, phase_number, ?deadline, "Armed phase timer");

        let tx = self.tx.clone();
        let sync_interval = self.sync_interval;
        tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            loop {
                let remaining = deadline.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    let _ = tx.send(TimerSignal::Expired {
                        session_id,
                        phase_number,
                    });
                    return;
                }
                let next_tick = remaining.min(sync_interval);
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(next_tick) => {
                        let remaining = deadline.saturating_sub(started.elapsed());
                        if remaining.is_zero() {
                            let _ = tx.send(TimerSignal::Expired { session_id, phase_number });
                            return;
                        }
                        let _ = tx.send(TimerSignal::Sync {
                            session_id,
                            phase_number,
                            remaining_seconds: remaining.as_secs(),
                        });
                    }
                }
            }
        });
    }

    /// Cancel and forget the session's timer, if any.
    pub fn cancel(&self, session_id: &SessionId) {
        if let Some((_, timer)) = self.timers.remove(session_id) {
            timer.cancel.cancel();
            tracing::debug!(%session_id, "Cancelled phase timer");
        }
    }

    /// The phase number the session's timer is currently armed for. An entry
    /// may linger after its timer fired; the phase-number fence makes that
    /// harmless.
    pub fn armed_phase(&self, session_id: &SessionId) -> Option<u32> {
        self.timers.get(session_id).map(|t| t.phase_number)
    }
}
