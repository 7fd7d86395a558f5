use std::sync::atomic::{AtomicU8, Ordering};

const NEW: u8 = 0;
const STARTED: u8 = 1;
const STOPPED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    New,
    Started,
    Stopped,
}

impl From<u8> for LifecycleState {
    fn from(v: u8) -> Self {
        match v {
            STARTED => LifecycleState::Started,
            STOPPED => LifecycleState::Stopped,
            _ => LifecycleState::New,
        }
    }
}

/// `New -> Started -> Stopped`. Re-`start` after `stop` is undefined by
/// the contract; this tracker just reports whatever state it's in.
#[derive(Debug, Default)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub fn new() -> Self {
        Self(AtomicU8::new(NEW))
    }

    pub fn state(&self) -> LifecycleState {
        self.0.load(Ordering::Acquire).into()
    }

    /// Transitions New -> Started. Returns `true` the first time (caller
    /// should actually spawn workers); returns `false` on a redundant
    /// call so `start` stays idempotent.
    pub fn begin_start(&self) -> bool {
        self.0
            .compare_exchange(NEW, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Transitions Started -> Stopped. Returns `true` the first time;
    /// `false` if already stopped (or never started), so `stop` stays
    /// safe to call twice.
    pub fn begin_stop(&self) -> bool {
        self.0
            .compare_exchange(STARTED, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
