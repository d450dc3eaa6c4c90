//! On-screen keypad buffer for codes the scanner cannot read

/// Keys on the manual entry pad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypadKey {
    /// 0-9
    Digit(u8),
    Clear,
    Backspace,
}

impl KeypadKey {
    /// Map a typed character onto the pad
    pub fn from_char(c: char) -> Option<Self> {
        c.to_digit(10).map(|d| KeypadKey::Digit(d as u8))
    }
}

#[derive(Debug, Clone)]
pub struct ManualEntry {
    buffer: String,
    max_len: usize,
    min_len: usize,
}

impl ManualEntry {
    pub fn new(min_len: usize, max_len: usize) -> Self {
        Self { buffer: String::new(), max_len: max_len.max(min_len), min_len }
    }

    pub fn press(&mut self, key: KeypadKey) {
        match key {
            KeypadKey::Digit(d) if d <= 9 => {
                if self.buffer.len() < self.max_len {
                    self.buffer.push(char::from(b'0' + d));
                }
            }
            KeypadKey::Digit(_) => {}
            KeypadKey::Clear => self.buffer.clear(),
            KeypadKey::Backspace => {
                self.buffer.pop();
            }
        }
    }

    pub fn can_submit(&self) -> bool {
        self.buffer.len() >= self.min_len
    }

    /// Take the buffered code; `None` (buffer kept) while submit is disabled
    pub fn submit(&mut self) -> Option<String> {
        if !self.can_submit() {
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }

    pub fn cancel(&mut self) {
        self.buffer.clear();
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_digits(entry: &mut ManualEntry, digits: &str) {
        for c in digits.chars() {
            entry.press(KeypadKey::from_char(c).unwrap());
        }
    }

    #[test]
    fn test_submit_disabled_below_minimum() {
        let mut entry = ManualEntry::new(4, 24);
        type_digits(&mut entry, "123");
        assert!(!entry.can_submit());
        assert_eq!(entry.submit(), None);
        assert_eq!(entry.buffer(), "123");

        entry.press(KeypadKey::Digit(4));
        assert!(entry.can_submit());
        assert_eq!(entry.submit(), Some("1234".to_string()));
        assert_eq!(entry.buffer(), "");
    }

    #[test]
    fn test_clear_and_backspace() {
        let mut entry = ManualEntry::new(4, 24);
        type_digits(&mut entry, "10012");
        entry.press(KeypadKey::Backspace);
        assert_eq!(entry.buffer(), "1001");

        entry.press(KeypadKey::Clear);
        assert_eq!(entry.buffer(), "");
        entry.press(KeypadKey::Backspace);
        assert_eq!(entry.buffer(), "");
    }

    #[test]
    fn test_buffer_is_bounded() {
        let mut entry = ManualEntry::new(4, 6);
        type_digits(&mut entry, "123456789");
        assert_eq!(entry.buffer(), "123456");
    }

    #[test]
    fn test_cancel_discards_input() {
        let mut entry = ManualEntry::new(4, 24);
        type_digits(&mut entry, "5555");
        entry.cancel();
        assert_eq!(entry.buffer(), "");
        assert!(!entry.can_submit());
    }

    #[test]
    fn test_non_digit_characters_are_not_keys() {
        assert_eq!(KeypadKey::from_char('7'), Some(KeypadKey::Digit(7)));
        assert_eq!(KeypadKey::from_char('x'), None);

        let mut entry = ManualEntry::new(4, 24);
        entry.press(KeypadKey::Digit(12));
        assert_eq!(entry.buffer(), "");
    }
}
