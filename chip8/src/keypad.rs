//! Headless keypad.
use std::fmt::{self, Write};

use crate::devices::{all_keys, KeyCode, Keyboard};

/// Keyboard input state, with a one-shot slot for the next key press.
///
/// Key events must be delivered on the same thread that drives the
/// virtual machine. The machine picks up a delivered key at the start
/// of its next step.
#[derive(Debug, Default)]
pub struct Keypad {
    /// Pressed is a 1 bit, released is a 0 bit.
    state: u16,
    next_key: NextKey,
}

/// One-shot slot for `Fx0A (LD Vx, K)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum NextKey {
    #[default]
    Idle,
    Awaiting,
    Delivered(KeyCode),
}

impl Keypad {
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the key state to pressed.
    ///
    /// If a key press is being awaited, the key is delivered to the slot.
    pub fn key_down(&mut self, key: KeyCode) {
        self.state |= 1 << key.as_u8();

        if self.next_key == NextKey::Awaiting {
            log::debug!("key wait resolved with {key}");
            self.next_key = NextKey::Delivered(key);
        }
    }

    pub fn key_up(&mut self, key: KeyCode) {
        self.state &= !(1 << key.as_u8());
    }

    /// Clear the keyboard input state, setting all keys to up.
    ///
    /// An awaited key press stays armed.
    pub fn clear(&mut self) {
        self.state = 0;
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.state > 0
    }

    /// Whether the slot is armed and no key has been pressed yet.
    pub fn is_awaiting(&self) -> bool {
        self.next_key == NextKey::Awaiting
    }

    /// Returns the pressed keys as a human readable string.
    pub fn dump(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        if self.any_key() {
            write!(buf, "keys:")?;
            for key in all_keys().filter(|k| self.is_key_down(*k)) {
                write!(buf, " {key}")?;
            }
        }

        Ok(buf)
    }
}

impl Keyboard for Keypad {
    fn is_key_down(&self, key: KeyCode) -> bool {
        self.state & (1 << key.as_u8()) > 0
    }

    fn await_next_key(&mut self) {
        self.next_key = NextKey::Awaiting;
    }

    fn take_next_key(&mut self) -> Option<KeyCode> {
        match self.next_key {
            NextKey::Delivered(key) => {
                self.next_key = NextKey::Idle;
                Some(key)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut keypad = Keypad::new();

        keypad.key_down(KeyCode::Key0);
        assert_eq!(keypad.state, 0b00000000_00000001);
        assert!(keypad.is_key_down(KeyCode::Key0));
        assert!(!keypad.is_key_down(KeyCode::Key1));
        assert!(!keypad.is_key_down(KeyCode::Key7));

        keypad.key_down(KeyCode::Key7);
        assert_eq!(keypad.state, 0b00000000_10000001);
        assert!(keypad.is_key_down(KeyCode::Key7));

        keypad.key_up(KeyCode::Key0);
        assert_eq!(keypad.state, 0b00000000_10000000);
        assert!(!keypad.is_key_down(KeyCode::Key0));

        keypad.key_down(KeyCode::KeyF);
        assert_eq!(keypad.state, 0b10000000_10000000);
        assert!(keypad.is_key_down(KeyCode::KeyF));
        assert_eq!(keypad.dump().unwrap(), "keys: k7 kf");

        keypad.clear();
        assert!(!keypad.any_key());
        assert_eq!(keypad.dump().unwrap(), "");
    }

    #[test]
    fn test_next_key_is_one_shot() {
        let mut keypad = Keypad::new();

        // Presses before arming are not delivered.
        keypad.key_down(KeyCode::Key1);
        assert_eq!(keypad.take_next_key(), None);

        keypad.await_next_key();
        assert!(keypad.is_awaiting());
        assert_eq!(keypad.take_next_key(), None);

        // Only the first press after arming is delivered.
        keypad.key_down(KeyCode::Key9);
        keypad.key_down(KeyCode::KeyB);
        assert!(!keypad.is_awaiting());
        assert_eq!(keypad.take_next_key(), Some(KeyCode::Key9));
        assert_eq!(keypad.take_next_key(), None);
    }
}
