//! Key mapping
use std::io::Read;

use chip8::KeyCode;
use serde::Deserialize;

use crate::error::AppError;

/// Host keyboard layout used when no keymap file is given.
const QWERTY: &str = "1234qwerasdfzxcv";

/// Maps typed characters to Chip8 keycodes.
///
/// A keymap file is a YAML list of definitions, each binding
/// one Chip8 key to one or more characters:
///
/// ```yaml
/// - chip8: 5
///   keyboard_keys: [w, k]
/// - chip8: 8
///   keyboard_keys: [s, j]
/// ```
#[derive(Debug)]
pub struct KeyMap {
    keys: Box<[(char, KeyCode)]>,
}

#[derive(Debug, Deserialize)]
struct KeyDef {
    chip8: KeyCode,
    keyboard_keys: Option<Vec<char>>,
}

impl KeyMap {
    /// Layout of the COSMAC VIP keypad on the left side of a QWERTY keyboard.
    pub fn qwerty() -> Self {
        let keys = QWERTY
            .chars()
            .filter_map(|c| KeyCode::from_qwerty(c).map(|keycode| (c, keycode)))
            .collect();

        Self { keys }
    }

    pub fn from_file(filepath: &str) -> Result<Self, AppError> {
        let file = std::fs::File::open(filepath)?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, AppError> {
        let defs: Vec<KeyDef> = serde_yaml::from_reader(reader)?;
        log::debug!("loaded key definitions: {defs:#?}");

        Ok(Self {
            keys: Self::build_keys(&defs),
        })
    }

    fn build_keys(defs: &[KeyDef]) -> Box<[(char, KeyCode)]> {
        defs.iter()
            .filter_map(|def| def.keyboard_keys.as_ref().map(|keys| (def.chip8, keys)))
            .flat_map(|(keycode, keys)| {
                keys.iter()
                    .map(move |c| (c.to_ascii_lowercase(), keycode))
            })
            .collect()
    }

    /// Case insensitive lookup of a typed character.
    pub fn map_key(&self, c: char) -> Option<KeyCode> {
        let c = c.to_ascii_lowercase();
        self.keys
            .iter()
            .find(|(key, _)| *key == c)
            .map(|(_, keycode)| *keycode)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_qwerty() {
        let keymap = KeyMap::qwerty();
        assert_eq!(keymap.map_key('q'), Some(KeyCode::Key4));
        assert_eq!(keymap.map_key('V'), Some(KeyCode::KeyF));
        assert_eq!(keymap.map_key('4'), Some(KeyCode::KeyC));
        assert_eq!(keymap.map_key('p'), None);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = "
- chip8: 5
  keyboard_keys: [w, K]
- chip8: 12
  keyboard_keys: [p]
- chip8: 0
";
        let keymap = KeyMap::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(keymap.map_key('w'), Some(KeyCode::Key5));
        assert_eq!(keymap.map_key('k'), Some(KeyCode::Key5));
        assert_eq!(keymap.map_key('P'), Some(KeyCode::KeyC));
        // Layout is replaced, not extended.
        assert_eq!(keymap.map_key('q'), None);
    }

    #[test]
    fn test_invalid_keycode() {
        let yaml = "- chip8: 16\n  keyboard_keys: [w]\n";
        assert!(KeyMap::from_reader(yaml.as_bytes()).is_err());

        let yaml = "- chip8: -1\n  keyboard_keys: [w]\n";
        assert!(KeyMap::from_reader(yaml.as_bytes()).is_err());
    }
}
