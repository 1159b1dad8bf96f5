// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;

/// A raw input event from the host. Keys are physical key tokens and are
/// matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown { key: String, repeat: bool },
    KeyUp { key: String },
    PointerDown { key: String },
    PointerUp { key: String },
    PointerCancel { key: String },
    PointerLeave { key: String },
    /// The window lost focus.
    Blur,
    /// The page was hidden.
    VisibilityHidden,
}

impl InputEvent {
    pub fn key_down(key: &str) -> InputEvent {
        InputEvent::KeyDown {
            key: key.to_string(),
            repeat: false,
        }
    }

    pub fn key_up(key: &str) -> InputEvent {
        InputEvent::KeyUp {
            key: key.to_string(),
        }
    }

    /// Returns the lowercased key this event refers to, if any.
    pub fn key(&self) -> Option<String> {
        match self {
            InputEvent::KeyDown { key, .. }
            | InputEvent::KeyUp { key }
            | InputEvent::PointerDown { key }
            | InputEvent::PointerUp { key }
            | InputEvent::PointerCancel { key }
            | InputEvent::PointerLeave { key } => Some(key.to_lowercase()),
            InputEvent::Blur | InputEvent::VisibilityHidden => None,
        }
    }

    /// Returns true for events that take input focus away.
    pub fn is_interruption(&self) -> bool {
        matches!(self, InputEvent::Blur | InputEvent::VisibilityHidden)
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::KeyDown { key, repeat } => {
                write!(f, "key down {}{}", key, if *repeat { " (repeat)" } else { "" })
            }
            InputEvent::KeyUp { key } => write!(f, "key up {}", key),
            InputEvent::PointerDown { key } => write!(f, "pointer down {}", key),
            InputEvent::PointerUp { key } => write!(f, "pointer up {}", key),
            InputEvent::PointerCancel { key } => write!(f, "pointer cancel {}", key),
            InputEvent::PointerLeave { key } => write!(f, "pointer leave {}", key),
            InputEvent::Blur => f.write_str("blur"),
            InputEvent::VisibilityHidden => f.write_str("visibility hidden"),
        }
    }
}
