//! Key vocabulary shared by the script parser and the input backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys with a name rather than a printable character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Enter,
    Tab,
    Space,
    Backspace,
    Escape,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Ctrl,
    Shift,
    Alt,
    Meta,
    CapsLock,
    F(u8),
}

/// A key that can be pressed by the input synthesizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Named(NamedKey),
    Char(char),
}

impl Key {
    /// Parse a key label. Names are case-insensitive and accept common
    /// aliases; any other single character is taken literally.
    pub fn parse(label: &str) -> Option<Key> {
        let lower = label.trim().to_lowercase();
        let named = match lower.as_str() {
            // Arrow keys
            "up" | "arrowup" => NamedKey::Up,
            "down" | "arrowdown" => NamedKey::Down,
            "left" | "arrowleft" => NamedKey::Left,
            "right" | "arrowright" => NamedKey::Right,
            // Navigation keys
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" | "page_up" | "pgup" => NamedKey::PageUp,
            "pagedown" | "page_down" | "pgdn" => NamedKey::PageDown,
            "delete" | "del" => NamedKey::Delete,
            // Common keys
            "enter" | "return" => NamedKey::Enter,
            "space" | "spacebar" => NamedKey::Space,
            "tab" => NamedKey::Tab,
            "backspace" | "bs" => NamedKey::Backspace,
            "escape" | "esc" => NamedKey::Escape,
            "capslock" | "caps" => NamedKey::CapsLock,
            // Modifiers
            "ctrl" | "control" => NamedKey::Ctrl,
            "shift" => NamedKey::Shift,
            "alt" | "option" => NamedKey::Alt,
            "meta" | "win" | "cmd" | "command" | "super" => NamedKey::Meta,
            // Function keys
            f if f.len() >= 2 && f.starts_with('f') => {
                let n: u8 = f[1..].parse().ok()?;
                if !(1..=12).contains(&n) {
                    return None;
                }
                NamedKey::F(n)
            }
            _ => {
                let mut chars = label.trim().chars();
                let ch = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                if ch == ' ' {
                    return Some(Key::Named(NamedKey::Space));
                }
                return Some(Key::Char(ch));
            }
        };
        Some(Key::Named(named))
    }

    /// Canonical label, accepted by [`Key::parse`]
    pub fn name(&self) -> String {
        match self {
            Key::Char(c) => c.to_string(),
            Key::Named(named) => match named {
                NamedKey::Enter => "enter".into(),
                NamedKey::Tab => "tab".into(),
                NamedKey::Space => "space".into(),
                NamedKey::Backspace => "backspace".into(),
                NamedKey::Escape => "esc".into(),
                NamedKey::Delete => "delete".into(),
                NamedKey::Home => "home".into(),
                NamedKey::End => "end".into(),
                NamedKey::PageUp => "pageup".into(),
                NamedKey::PageDown => "pagedown".into(),
                NamedKey::Up => "up".into(),
                NamedKey::Down => "down".into(),
                NamedKey::Left => "left".into(),
                NamedKey::Right => "right".into(),
                NamedKey::Ctrl => "ctrl".into(),
                NamedKey::Shift => "shift".into(),
                NamedKey::Alt => "alt".into(),
                NamedKey::Meta => "meta".into(),
                NamedKey::CapsLock => "capslock".into(),
                NamedKey::F(n) => format!("f{}", n),
            },
        }
    }

    /// True if the canonical label would also parse as a number
    pub fn looks_numeric(&self) -> bool {
        matches!(self, Key::Char(c) if c.is_ascii_digit())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Mouse buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(Key::parse("Return"), Some(Key::Named(NamedKey::Enter)));
        assert_eq!(Key::parse("ESC"), Some(Key::Named(NamedKey::Escape)));
        assert_eq!(Key::parse("pgdn"), Some(Key::Named(NamedKey::PageDown)));
        assert_eq!(Key::parse("control"), Some(Key::Named(NamedKey::Ctrl)));
        assert_eq!(Key::parse("F11"), Some(Key::Named(NamedKey::F(11))));
    }

    #[test]
    fn single_characters_are_literal() {
        assert_eq!(Key::parse("a"), Some(Key::Char('a')));
        assert_eq!(Key::parse("A"), Some(Key::Char('A')));
        assert_eq!(Key::parse("7"), Some(Key::Char('7')));
    }

    #[test]
    fn rejects_unknown_words() {
        assert_eq!(Key::parse("banana"), None);
        assert_eq!(Key::parse("f13"), None);
        assert_eq!(Key::parse(""), None);
    }

    #[test]
    fn canonical_names_parse_back() {
        for label in ["enter", "esc", "pageup", "f5", "ctrl", "meta", "x", "9", "capslock"] {
            let key = Key::parse(label).unwrap();
            assert_eq!(Key::parse(&key.name()), Some(key));
        }
    }
}
