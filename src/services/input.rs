//! Input focus and key routing for a scanning surface
//!
//! The barcode scanner acts as a keyboard wedge (characters then Enter).
//! The keypad and the clear-conveyor guard temporarily take focus and
//! always hand it back to the scanner when they finish.

use crate::infra::config::Config;
use crate::services::clear_guard::{ClearConveyorGuard, GuardOutcome};
use crate::services::manual_entry::{KeypadKey, ManualEntry};
use crate::services::scan_controller::{ScanCommand, ScanSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Scanner,
    Keypad,
    ClearGuard,
}

pub struct InputRouter {
    focus: Focus,
    scanner_buffer: String,
    keypad: ManualEntry,
    guard: ClearConveyorGuard,
}

impl InputRouter {
    pub fn new(config: &Config) -> Self {
        Self {
            focus: Focus::Scanner,
            scanner_buffer: String::new(),
            keypad: ManualEntry::new(config.min_code_len(), config.keypad_max_len()),
            guard: ClearConveyorGuard::new(),
        }
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn scanner_char(&mut self, c: char) {
        if self.focus == Focus::Scanner && !c.is_control() {
            self.scanner_buffer.push(c);
        }
    }

    pub fn scanner_backspace(&mut self) {
        if self.focus == Focus::Scanner {
            self.scanner_buffer.pop();
        }
    }

    /// End of a scanner burst; blank lines are dropped
    pub fn scanner_enter(&mut self) -> Option<ScanCommand> {
        if self.focus != Focus::Scanner {
            return None;
        }
        let code = std::mem::take(&mut self.scanner_buffer);
        if code.trim().is_empty() {
            return None;
        }
        Some(ScanCommand::Scan { code, source: ScanSource::Scanner })
    }

    pub fn open_keypad(&mut self) {
        self.keypad.cancel();
        self.focus = Focus::Keypad;
    }

    pub fn keypad_press(&mut self, key: KeypadKey) {
        if self.focus == Focus::Keypad {
            self.keypad.press(key);
        }
    }

    /// Submit the keypad buffer; focus stays on the keypad while disabled
    pub fn keypad_submit(&mut self) -> Option<ScanCommand> {
        if self.focus != Focus::Keypad {
            return None;
        }
        let code = self.keypad.submit()?;
        self.focus = Focus::Scanner;
        Some(ScanCommand::Scan { code, source: ScanSource::Keypad })
    }

    pub fn keypad_cancel(&mut self) {
        self.keypad.cancel();
        self.focus = Focus::Scanner;
    }

    pub fn open_clear_guard(&mut self) {
        self.guard.reset();
        self.focus = Focus::ClearGuard;
    }

    pub fn guard_press(&mut self, digit: u8) -> Option<ScanCommand> {
        if self.focus != Focus::ClearGuard {
            return None;
        }
        match self.guard.press(digit) {
            GuardOutcome::Confirmed => {
                self.focus = Focus::Scanner;
                Some(ScanCommand::ClearConveyor)
            }
            GuardOutcome::Pending => None,
        }
    }

    pub fn close_clear_guard(&mut self) {
        self.guard.reset();
        self.focus = Focus::Scanner;
    }

    pub fn scanner_buffer(&self) -> &str {
        &self.scanner_buffer
    }

    pub fn keypad(&self) -> &ManualEntry {
        &self.keypad
    }

    pub fn guard(&self) -> &ClearConveyorGuard {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> InputRouter {
        InputRouter::new(&Config::default())
    }

    #[test]
    fn test_scanner_burst_becomes_scan() {
        let mut input = router();
        "1001-2".chars().for_each(|c| input.scanner_char(c));
        assert_eq!(
            input.scanner_enter(),
            Some(ScanCommand::Scan { code: "1001-2".to_string(), source: ScanSource::Scanner })
        );
        assert_eq!(input.scanner_buffer(), "");
        assert_eq!(input.scanner_enter(), None);
    }

    #[test]
    fn test_short_scanner_input_still_reaches_controller() {
        let mut input = router();
        "AB".chars().for_each(|c| input.scanner_char(c));
        assert!(matches!(input.scanner_enter(), Some(ScanCommand::Scan { .. })));
    }

    #[test]
    fn test_keypad_submit_returns_focus() {
        let mut input = router();
        input.open_keypad();
        assert_eq!(input.focus(), Focus::Keypad);

        // Scanner characters are ignored while the keypad has focus
        input.scanner_char('9');
        assert_eq!(input.scanner_buffer(), "");

        for d in [1, 0, 0] {
            input.keypad_press(KeypadKey::Digit(d));
        }
        assert_eq!(input.keypad_submit(), None);
        assert_eq!(input.focus(), Focus::Keypad);

        input.keypad_press(KeypadKey::Digit(2));
        assert_eq!(
            input.keypad_submit(),
            Some(ScanCommand::Scan { code: "1002".to_string(), source: ScanSource::Keypad })
        );
        assert_eq!(input.focus(), Focus::Scanner);
        assert_eq!(input.keypad().buffer(), "");
    }

    #[test]
    fn test_keypad_cancel_returns_focus() {
        let mut input = router();
        input.open_keypad();
        input.keypad_press(KeypadKey::Digit(5));
        input.keypad_cancel();
        assert_eq!(input.focus(), Focus::Scanner);
        assert_eq!(input.keypad().buffer(), "");
    }

    #[test]
    fn test_guard_confirmation_emits_clear() {
        let mut input = router();
        assert_eq!(input.guard_press(1), None);

        input.open_clear_guard();
        let commands: Vec<_> = [4, 1, 2, 3].into_iter().filter_map(|d| input.guard_press(d)).collect();
        assert_eq!(commands, vec![ScanCommand::ClearConveyor]);
        assert_eq!(input.focus(), Focus::Scanner);
    }

    #[test]
    fn test_reopening_guard_forgets_partial_sequence() {
        let mut input = router();
        input.open_clear_guard();
        input.guard_press(1);
        input.guard_press(2);
        input.close_clear_guard();

        input.open_clear_guard();
        assert_eq!(input.guard_press(3), None);
        assert_eq!(input.guard().window(), &[3]);
    }
}
