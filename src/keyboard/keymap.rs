//! Scancode definitions and the scanner's decode table

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Represents a physical key code (Linux input scancode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u16);

impl KeyCode {
    /// Carriage return / line feed, ends a scanned code
    pub const TERMINATOR: KeyCode = KeyCode(28);
    /// Left shift, sent by the scanner before capitals and carries no payload
    pub const LEFT_SHIFT: KeyCode = KeyCode(42);

    pub fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for KeyCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named non-printable keys the scanner can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKey {
    Escape,
    Backspace,
    Tab,
    /// Enter key, the code terminator
    CrLf,
    LeftCtrl,
    LeftShift,
    RightShift,
    LeftAlt,
    RightAlt,
}

impl ControlKey {
    /// Short label used when the key ends up inside a code
    pub fn label(&self) -> &'static str {
        match self {
            Self::Escape => "ESC",
            Self::Backspace => "BKSP",
            Self::Tab => "TAB",
            Self::CrLf => "CRLF",
            Self::LeftCtrl => "LCTRL",
            Self::LeftShift => "LSHFT",
            Self::RightShift => "RSHFT",
            Self::LeftAlt => "LALT",
            Self::RightAlt => "RALT",
        }
    }
}

/// Result of decoding a mapped scancode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySymbol {
    /// Single printable character
    Char(char),
    /// Named control key
    Control(ControlKey),
}

impl KeySymbol {
    /// Append the textual form of this symbol to `out`
    pub fn write_to(&self, out: &mut String) {
        match self {
            Self::Char(c) => out.push(*c),
            Self::Control(key) => out.push_str(key.label()),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Control(ControlKey::CrLf))
    }
}

impl fmt::Display for KeySymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{}", c),
            Self::Control(key) => f.write_str(key.label()),
        }
    }
}

/// Error returned for scancodes outside the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no mapping for scancode {0}")]
pub struct Unmapped(pub KeyCode);

/// Static decode table for a keyboard-emulating scanner on a US layout.
///
/// Numpad, function and navigation keys are intentionally absent; a scanner
/// never sends them, so seeing one means the stream is corrupt.
pub static SCANCODE_TABLE: LazyLock<HashMap<KeyCode, KeySymbol>> = LazyLock::new(|| {
    use ControlKey::*;
    use KeySymbol::{Char, Control};

    let mut map = HashMap::new();

    map.insert(KeyCode(1), Control(Escape));

    // Number row
    for (offset, c) in "1234567890".chars().enumerate() {
        map.insert(KeyCode(2 + offset as u16), Char(c));
    }
    map.insert(KeyCode(12), Char('-'));
    map.insert(KeyCode(13), Char('='));
    map.insert(KeyCode(14), Control(Backspace));

    // Top letter row
    map.insert(KeyCode(15), Control(Tab));
    for (offset, c) in "QWERTYUIOP".chars().enumerate() {
        map.insert(KeyCode(16 + offset as u16), Char(c));
    }
    map.insert(KeyCode(26), Char('['));
    map.insert(KeyCode(27), Char(']'));
    map.insert(KeyCode(28), Control(CrLf));
    map.insert(KeyCode(29), Control(LeftCtrl));

    // Home row
    for (offset, c) in "ASDFGHJKL".chars().enumerate() {
        map.insert(KeyCode(30 + offset as u16), Char(c));
    }
    map.insert(KeyCode(39), Char(';'));
    map.insert(KeyCode(40), Char('"'));
    map.insert(KeyCode(41), Char('`'));
    map.insert(KeyCode(42), Control(LeftShift));
    map.insert(KeyCode(43), Char('\\'));

    // Bottom letter row
    for (offset, c) in "ZXCVBNM".chars().enumerate() {
        map.insert(KeyCode(44 + offset as u16), Char(c));
    }
    map.insert(KeyCode(51), Char(','));
    map.insert(KeyCode(52), Char('.'));
    map.insert(KeyCode(53), Char('/'));
    map.insert(KeyCode(54), Control(RightShift));

    // Modifiers
    map.insert(KeyCode(56), Control(LeftAlt));
    map.insert(KeyCode(100), Control(RightAlt));

    map
});

/// Decode a scancode into its symbol
pub fn decode(code: KeyCode) -> Result<KeySymbol, Unmapped> {
    SCANCODE_TABLE.get(&code).copied().ok_or(Unmapped(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_letters_and_digits() {
        assert_eq!(decode(KeyCode(30)), Ok(KeySymbol::Char('A')));
        assert_eq!(decode(KeyCode(16)), Ok(KeySymbol::Char('Q')));
        assert_eq!(decode(KeyCode(50)), Ok(KeySymbol::Char('M')));
        assert_eq!(decode(KeyCode(2)), Ok(KeySymbol::Char('1')));
        assert_eq!(decode(KeyCode(11)), Ok(KeySymbol::Char('0')));
    }

    #[test]
    fn decodes_punctuation() {
        assert_eq!(decode(KeyCode(12)), Ok(KeySymbol::Char('-')));
        assert_eq!(decode(KeyCode(40)), Ok(KeySymbol::Char('"')));
        assert_eq!(decode(KeyCode(43)), Ok(KeySymbol::Char('\\')));
        assert_eq!(decode(KeyCode(53)), Ok(KeySymbol::Char('/')));
    }

    #[test]
    fn decodes_control_keys() {
        assert_eq!(decode(KeyCode::TERMINATOR), Ok(KeySymbol::Control(ControlKey::CrLf)));
        assert_eq!(decode(KeyCode::LEFT_SHIFT), Ok(KeySymbol::Control(ControlKey::LeftShift)));
        assert_eq!(decode(KeyCode(100)), Ok(KeySymbol::Control(ControlKey::RightAlt)));
        assert!(decode(KeyCode::TERMINATOR).unwrap().is_terminator());
    }

    #[test]
    fn unmapped_codes_are_errors() {
        for code in [0u16, 55, 57, 58, 59, 87, 99, 101, 125, 300] {
            assert_eq!(decode(KeyCode(code)), Err(Unmapped(KeyCode(code))));
        }
    }

    #[test]
    fn table_covers_expected_codes() {
        // 1..=54 except nothing, plus 56 and 100
        assert_eq!(SCANCODE_TABLE.len(), 56);
        for code in 1..=54u16 {
            assert!(SCANCODE_TABLE.contains_key(&KeyCode(code)), "missing {}", code);
        }
        assert!(SCANCODE_TABLE.contains_key(&KeyCode(56)));
        assert!(SCANCODE_TABLE.contains_key(&KeyCode(100)));
    }

    #[test]
    fn symbol_labels() {
        let mut out = String::new();
        KeySymbol::Char('X').write_to(&mut out);
        KeySymbol::Control(ControlKey::Tab).write_to(&mut out);
        assert_eq!(out, "XTAB");
        assert_eq!(KeySymbol::Control(ControlKey::Escape).to_string(), "ESC");
    }
}
