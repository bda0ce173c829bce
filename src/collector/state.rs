//! Collector lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Stopped = 0,
    Running = 1,
    Stopping = 2,
}

impl From<u8> for CollectorState {
    fn from(val: u8) -> Self {
        match val {
            1 => CollectorState::Running,
            2 => CollectorState::Stopping,
            _ => CollectorState::Stopped,
        }
    }
}

/// Lock-free cell shared by the handle and the supervisor.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: CollectorState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> CollectorState {
        CollectorState::from(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: CollectorState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_u8() {
        let cell = StateCell::new(CollectorState::Stopped);
        for state in [CollectorState::Running, CollectorState::Stopping, CollectorState::Stopped] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
        assert_eq!(CollectorState::from(9), CollectorState::Stopped);
    }
}
