//! Physical confirmation gesture for emptying the conveyor
//!
//! Not a credential: the operator types 1, 2, 3 in a row. Only the last
//! three keys count, so stray presses before the sequence are harmless.

const SEQUENCE: [u8; 3] = [1, 2, 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Default)]
pub struct ClearConveyorGuard {
    window: Vec<u8>,
}

impl ClearConveyorGuard {
    pub fn new() -> Self {
        Self { window: Vec::with_capacity(SEQUENCE.len()) }
    }

    /// Forget earlier keys (called when the guard is opened)
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn press(&mut self, digit: u8) -> GuardOutcome {
        if self.window.len() == SEQUENCE.len() {
            self.window.remove(0);
        }
        self.window.push(digit);

        if self.window == SEQUENCE {
            self.window.clear();
            GuardOutcome::Confirmed
        } else {
            GuardOutcome::Pending
        }
    }

    /// Keys currently in the window, oldest first
    pub fn window(&self) -> &[u8] {
        &self.window
    }
}
