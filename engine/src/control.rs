//! Cooperative pause and cancellation signals.
//!
//! `PauseGate` and `CancellationSignal` are two views over one shared
//! lock/condition-variable pair. A worker blocked on a closed gate wakes up
//! and exits when the job is cancelled: `cancel()` notifies the same waiters
//! that `resume()` does.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Signals {
    paused: bool,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct Shared {
    signals: Mutex<Signals>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Signals> {
        self.signals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create the pause gate (initially open) and cancellation signal (initially
/// unset) for one job.
pub fn job_controls() -> (PauseGate, CancellationSignal) {
    let shared = Arc::new(Shared::default());
    (
        PauseGate {
            shared: Arc::clone(&shared),
        },
        CancellationSignal { shared },
    )
}

/// What a worker should do after passing a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Keep copying
    Continue,
    /// Stop; cancellation was requested
    Cancelled,
}

/// Binary gate that suspends workers while closed.
#[derive(Debug, Clone)]
pub struct PauseGate {
    shared: Arc<Shared>,
}

impl PauseGate {
    /// Close the gate. Returns false if it was already closed.
    pub fn pause(&self) -> bool {
        let mut signals = self.shared.lock();
        if signals.paused {
            return false;
        }
        signals.paused = true;
        true
    }

    /// Open the gate and wake every suspended worker. Returns false if it was
    /// already open.
    pub fn resume(&self) -> bool {
        let mut signals = self.shared.lock();
        if !signals.paused {
            return false;
        }
        signals.paused = false;
        drop(signals);
        self.shared.changed.notify_all();
        true
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused
    }

    /// Pass the gate, blocking while it is closed.
    ///
    /// Cancellation takes priority: a set signal returns `Cancelled` whether
    /// or not the gate is closed, including while blocked. `on_suspend(true)`
    /// runs right before the caller blocks and `on_suspend(false)` right after
    /// it wakes; neither runs if the gate was open.
    pub fn checkpoint<F: FnMut(bool)>(&self, mut on_suspend: F) -> Checkpoint {
        {
            let signals = self.shared.lock();
            if signals.cancelled {
                return Checkpoint::Cancelled;
            }
            if !signals.paused {
                return Checkpoint::Continue;
            }
        }

        on_suspend(true);
        let signals = self
            .shared
            .changed
            .wait_while(self.shared.lock(), |s| s.paused && !s.cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        let cancelled = signals.cancelled;
        drop(signals);
        on_suspend(false);

        if cancelled {
            Checkpoint::Cancelled
        } else {
            Checkpoint::Continue
        }
    }
}

/// One-shot stop request shared by every worker of a job.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    shared: Arc<Shared>,
}

impl CancellationSignal {
    /// Request cancellation. Only the first call has an effect; returns true
    /// for that call.
    pub fn cancel(&self) -> bool {
        let mut signals = self.shared.lock();
        if signals.cancelled {
            return false;
        }
        signals.cancelled = true;
        drop(signals);
        self.shared.changed.notify_all();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().cancelled
    }
}
