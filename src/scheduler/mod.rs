use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Why a checkpoint refused to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// `stop` was requested; the program must yield without resuming.
    Stopped,
    /// The armed deadline has passed (per-test time limits).
    TimeLimit,
}

#[derive(Default)]
struct ControlState {
    deadline: Option<Instant>,
    on_stopped: Vec<Box<dyn FnOnce() + Send>>,
}

/// Shared control block for one program: the cooperative scheduler's stop
/// flag, the currently armed deadline, and the callbacks waiting for the
/// program to yield.
///
/// The evaluator calls [`ExecControl::checkpoint`] between statements, at
/// loop back-edges and on function entry; those are the suspension points.
/// Because the flag is consulted before every resume, a stopped runner is
/// never resumed and pending timers cannot revive it.
pub struct ExecControl {
    running: AtomicBool,
    stop_requested: AtomicBool,
    state: Mutex<ControlState>,
}

impl ExecControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            state: Mutex::new(ControlState::default()),
        })
    }

    /// The suspension point. Cheap enough to call per statement.
    pub fn checkpoint(&self) -> Result<(), Interrupt> {
        if self.stop_requested.load(Ordering::Relaxed) {
            return Err(Interrupt::Stopped);
        }
        let state = self.state.lock();
        match state.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::TimeLimit),
            _ => Ok(()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_requested.load(Ordering::Relaxed)
    }

    /// Arm a deadline, returning whatever deadline was armed before so the
    /// caller can restore it (test bodies nest inside the program run).
    pub fn arm_deadline(&self, timeout: Duration) -> Option<Instant> {
        let mut state = self.state.lock();
        state.deadline.replace(Instant::now() + timeout)
    }

    pub fn restore_deadline(&self, previous: Option<Instant>) {
        self.state.lock().deadline = previous;
    }

    pub fn begin_run(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// The program yielded. Drains and fires the stop callbacks if a stop
    /// was requested while it ran. The running flag flips inside the state
    /// lock so a concurrent `request_stop` either enqueues before the drain
    /// or observes the program as idle; a callback can never be lost.
    pub fn end_run(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            self.running.store(false, Ordering::SeqCst);
            if self.stop_requested.load(Ordering::SeqCst) {
                std::mem::take(&mut state.on_stopped)
            } else {
                Vec::new()
            }
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Request a stop. If the program is mid-run the callback fires after it
    /// reaches the next suspension point and yields; otherwise it fires
    /// immediately. `stop` always succeeds.
    pub fn request_stop(&self, on_stopped: Box<dyn FnOnce() + Send>) {
        self.stop_requested.store(true, Ordering::SeqCst);
        let deferred = {
            let mut state = self.state.lock();
            if self.running.load(Ordering::SeqCst) {
                state.on_stopped.push(on_stopped);
                None
            } else {
                Some(on_stopped)
            }
        };
        if let Some(on_stopped) = deferred {
            on_stopped();
        }
    }
}

/// Cloneable, thread-safe handle a host can use to stop a running program
/// from outside the interpreter thread.
#[derive(Clone)]
pub struct StopHandle(Arc<ExecControl>);

impl StopHandle {
    pub fn new(control: Arc<ExecControl>) -> Self {
        Self(control)
    }

    pub fn stop(&self, on_stopped: impl FnOnce() + Send + 'static) {
        self.0.request_stop(Box::new(on_stopped));
    }
}
