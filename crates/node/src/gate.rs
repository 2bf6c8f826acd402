use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Counting admission control for threads entering the enclave.
///
/// Initialized with the number of thread control structures the enclave was
/// built with. [`Gate::acquire`] blocks until a slot is free; the slot is
/// returned when the permit is dropped, on every exit path.
pub struct Gate {
    slots: usize,
    held: Mutex<usize>,
    released: Condvar,
}

/// One held enclave slot
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit<'a> {
    gate: &'a Gate,
}

impl Gate {
    pub fn new(slots: usize) -> Self {
        assert!(slots > 0, "gate needs at least one slot");
        Self {
            slots,
            held: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Block the calling thread until a slot is free and take it
    pub fn acquire(&self) -> GatePermit<'_> {
        let mut held = self.held.lock();
        while *held >= self.slots {
            self.released.wait(&mut held);
        }
        *held += 1;
        trace!(held = *held, "enclave slot acquired");
        GatePermit { gate: self }
    }

    /// Take a slot if one is free right now
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        let mut held = self.held.lock();
        if *held >= self.slots {
            return None;
        }
        *held += 1;
        Some(GatePermit { gate: self })
    }

    /// Total number of slots
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Number of slots currently held
    pub fn held(&self) -> usize {
        *self.held.lock()
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let mut held = self.gate.held.lock();
        *held -= 1;
        self.gate.released.notify_one();
    }
}
