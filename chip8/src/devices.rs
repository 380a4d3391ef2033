//! IO device interface
//!
//! The virtual machine owns its devices, and calls into them while
//! executing instructions. Hosts supply their own implementations for
//! a window, speaker or physical keyboard. Headless implementations are
//! provided by [`FrameBuffer`](crate::FrameBuffer), [`Keypad`](crate::Keypad)
//! and [`Buzzer`].
use crate::{constants::*, vm::Hz};

/// Monochrome pixel surface that sprites are drawn to.
pub trait Screen {
    /// Toggle the pixel at the given coordinate.
    ///
    /// Returns `true` when the pixel is turned off, which the
    /// interpreter reports as a sprite collision.
    ///
    /// Coordinates are wrapped once, and only when strictly past the edge,
    /// so they are not confined to the 64x32 grid. `x` is in `0..=198` and
    /// `y` is in `0..=237`. Implementations must not index a row-major
    /// buffer with them unchecked.
    fn set_pixel(&mut self, x: usize, y: usize) -> bool;

    /// Turn off all pixels.
    fn clear(&mut self);

    /// Blit the display buffer to screen output.
    fn render(&mut self);
}

/// Hexadecimal keypad input.
pub trait Keyboard {
    /// Checks immediately whether the given key is currently pressed.
    fn is_key_down(&self, key: KeyCode) -> bool;

    /// Arm the one-shot slot for the next key press.
    ///
    /// Only the first key pressed after arming is delivered.
    fn await_next_key(&mut self);

    /// Take the key delivered to the armed slot, leaving the slot idle.
    ///
    /// Returns `None` while no key has been pressed yet.
    fn take_next_key(&mut self) -> Option<KeyCode>;
}

/// Single tone sound output.
pub trait Tone {
    /// Start playing at the given frequency. No-op when already playing.
    fn start(&mut self, frequency: Hz);

    /// Stop playing. No-op when already silent.
    fn stop(&mut self);
}

/// Silent tone device that tracks whether it would be playing.
#[derive(Debug, Default)]
pub struct Buzzer {
    playing: Option<Hz>,
}

impl Buzzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    pub fn frequency(&self) -> Option<Hz> {
        self.playing
    }
}

impl Tone for Buzzer {
    fn start(&mut self, frequency: Hz) {
        if self.playing.is_none() {
            log::debug!("buzzer on at {}Hz", frequency.0);
            self.playing = Some(frequency);
        }
    }

    fn stop(&mut self) {
        if self.playing.take().is_some() {
            log::debug!("buzzer off");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyCode {
    Key0 = 0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF = 0xF,
}

impl KeyCode {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Map a character on a QWERTY keyboard to the keypad layout
    /// of the COSMAC VIP.
    ///
    /// ```text
    /// 1 2 3 4      1 2 3 C
    /// Q W E R  =>  4 5 6 D
    /// A S D F      7 8 9 E
    /// Z X C V      A 0 B F
    /// ```
    pub fn from_qwerty(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            '1' => Some(Self::Key1),
            '2' => Some(Self::Key2),
            '3' => Some(Self::Key3),
            '4' => Some(Self::KeyC),
            'q' => Some(Self::Key4),
            'w' => Some(Self::Key5),
            'e' => Some(Self::Key6),
            'r' => Some(Self::KeyD),
            'a' => Some(Self::Key7),
            's' => Some(Self::Key8),
            'd' => Some(Self::Key9),
            'f' => Some(Self::KeyE),
            'z' => Some(Self::KeyA),
            'x' => Some(Self::Key0),
            'c' => Some(Self::KeyB),
            'v' => Some(Self::KeyF),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let key_id = self.as_u8();
        write!(f, "k{key_id:x}")
    }
}

impl From<KeyCode> for u8 {
    fn from(keycode: KeyCode) -> Self {
        keycode.as_u8()
    }
}

impl TryFrom<u8> for KeyCode {
    type Error = InvalidKeyCode;

    fn try_from(key_id: u8) -> Result<Self, Self::Error> {
        match key_id {
            0 => Ok(Self::Key0),
            1 => Ok(Self::Key1),
            2 => Ok(Self::Key2),
            3 => Ok(Self::Key3),
            4 => Ok(Self::Key4),
            5 => Ok(Self::Key5),
            6 => Ok(Self::Key6),
            7 => Ok(Self::Key7),
            8 => Ok(Self::Key8),
            9 => Ok(Self::Key9),
            10 => Ok(Self::KeyA),
            11 => Ok(Self::KeyB),
            12 => Ok(Self::KeyC),
            13 => Ok(Self::KeyD),
            14 => Ok(Self::KeyE),
            15 => Ok(Self::KeyF),
            _ => Err(InvalidKeyCode),
        }
    }
}

/// Iterate all keys in keypad order.
pub(crate) fn all_keys() -> impl Iterator<Item = KeyCode> {
    (0..KEY_COUNT).filter_map(|k| KeyCode::try_from(k).ok())
}

#[derive(Debug)]
pub struct InvalidKeyCode;

impl std::error::Error for InvalidKeyCode {}

impl std::fmt::Display for InvalidKeyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "keycode must be in range 0 <= keycode < 16")
    }
}

#[cfg(feature = "serde")]
mod de {
    use std::fmt::Display;

    use num_traits::AsPrimitive;
    use serde::de::{Deserialize, Error, Expected, Unexpected, Visitor};

    use super::*;

    impl Expected for InvalidKeyCode {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            <Self as Display>::fmt(self, f)
        }
    }

    impl<'de> Deserialize<'de> for KeyCode {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            // YAML integer type
            deserializer.deserialize_i64(KeyCodeVisitor)
        }
    }

    struct KeyCodeVisitor;

    impl KeyCodeVisitor {
        #[inline]
        fn check_int<N, E>(val: N) -> Result<(), E>
        where
            N: AsPrimitive<i64>,
            E: Error,
        {
            let n = val.as_();
            if n < 0 || n > u8::MAX as i64 {
                Err(E::invalid_value(Unexpected::Signed(n), &InvalidKeyCode))
            } else {
                Ok(())
            }
        }
    }

    impl<'de> Visitor<'de> for KeyCodeVisitor {
        type Value = KeyCode;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "an 8-bit integer between 0 and 16")
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: Error,
        {
            Self::check_int(v)?;
            KeyCode::try_from(v as u8).map_err(|err| E::invalid_value(Unexpected::Signed(v), &err))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: Error,
        {
            if v > u8::MAX as u64 {
                return Err(E::invalid_value(Unexpected::Unsigned(v), &InvalidKeyCode));
            }
            KeyCode::try_from(v as u8)
                .map_err(|err| E::invalid_value(Unexpected::Unsigned(v), &err))
        }
    }
}
