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
// Key-to-pitch mapping.
//
// Everything in here is pure: lookups in fixed tables plus the conversions
// between note names, MIDI numbers and frequencies.

use std::{fmt, str::FromStr};

/// The lowest and highest MIDI numbers a transposed key may produce.
pub const MIDI_MIN: i32 = 0;
pub const MIDI_MAX: i32 = 127;

/// The octave shift range for the instrument.
pub const OCTAVE_SHIFT_MIN: i8 = -2;
pub const OCTAVE_SHIFT_MAX: i8 = 2;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Chromatic instrument layout. The home row holds the white keys and the row
/// above it the black keys, starting at middle C.
const PIANO_KEY_TO_MIDI: [(&str, i32); 17] = [
    ("a", 60),
    ("w", 61),
    ("s", 62),
    ("e", 63),
    ("d", 64),
    ("f", 65),
    ("t", 66),
    ("g", 67),
    ("y", 68),
    ("h", 69),
    ("u", 70),
    ("j", 71),
    ("k", 72),
    ("o", 73),
    ("l", 74),
    ("p", 75),
    (";", 76),
];

/// White-key layout used by the trainer.
const TRAINER_KEYS: [(&str, &str); 8] = [
    ("a", "C4"),
    ("s", "D4"),
    ("d", "E4"),
    ("f", "F4"),
    ("g", "G4"),
    ("h", "A4"),
    ("j", "B4"),
    ("k", "C5"),
];

/// The notes the trainer draws its targets from, in staff order.
pub const NOTE_POOL: [&str; 8] = ["C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5"];

/// Error returned when a string is not a note name.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("'{0}' is not a note name")]
pub struct NoteParseError(String);

/// A pitch class and octave, e.g. C#4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteName {
    /// Semitone within the octave, 0 (C) through 11 (B).
    pitch_class: u8,
    octave: i32,
}

impl NoteName {
    /// Returns the MIDI number for this note. C4 is 60.
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.pitch_class as i32
    }

    /// Returns the frequency of this note in Hz.
    pub fn frequency(&self) -> f64 {
        midi_to_frequency(self.midi())
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    /// Returns the pitch class letter with its accidental, e.g. "F#".
    pub fn pitch_class(&self) -> &'static str {
        PITCH_CLASSES[self.pitch_class as usize]
    }

    /// Returns true if this is a natural (white key) note.
    pub fn is_natural(&self) -> bool {
        !self.pitch_class().ends_with('#')
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class(), self.octave)
    }
}

impl FromStr for NoteName {
    type Err = NoteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_note(s).ok_or_else(|| NoteParseError(s.to_string()))
    }
}

/// A resolved key: what a physical key plays under the current octave shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchAssignment {
    pub midi_number: i32,
    pub note_name: NoteName,
}

fn parse_note(s: &str) -> Option<NoteName> {
    let mut chars = s.chars();
    let letter = chars.next()?;
    let natural = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    // E and B have no sharp spelling.
    let (pitch_class, rest) = match rest.strip_prefix('#') {
        Some(_) if matches!(letter, 'E' | 'B') => return None,
        Some(rest) => (natural + 1, rest),
        None => (natural, rest),
    };

    // Only an optional minus sign followed by digits is accepted.
    let digits = rest.strip_prefix('-').unwrap_or(rest);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let octave: i32 = rest.parse().ok()?;

    // Keep the MIDI number representable.
    octave.checked_add(1)?.checked_mul(12)?.checked_add(11)?;

    Some(NoteName {
        pitch_class,
        octave,
    })
}

/// Parses a note name into its MIDI number. Returns None on malformed input.
pub fn note_to_midi(note: &str) -> Option<i32> {
    parse_note(note).map(|note| note.midi())
}

/// Converts a MIDI number back into a note name, spelled with sharps.
pub fn midi_to_note(midi: i32) -> NoteName {
    NoteName {
        pitch_class: midi.rem_euclid(12) as u8,
        octave: midi.div_euclid(12) - 1,
    }
}

/// Equal temperament frequency of the given MIDI number, A4 = 440 Hz.
pub fn midi_to_frequency(midi: i32) -> f64 {
    440.0 * 2.0_f64.powf((midi as f64 - 69.0) / 12.0)
}

/// Looks up the trainer note for a physical key.
pub fn key_to_note(key: &str) -> Option<NoteName> {
    let key = key.to_lowercase();
    TRAINER_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .and_then(|(_, note)| parse_note(note))
}

/// Looks up the trainer key that plays the given note.
pub fn note_to_key(note: &NoteName) -> Option<&'static str> {
    TRAINER_KEYS
        .iter()
        .find(|(_, n)| parse_note(n).as_ref() == Some(note))
        .map(|(k, _)| *k)
}

/// Looks up the untransposed MIDI number of an instrument key.
pub fn key_to_midi(key: &str) -> Option<i32> {
    let key = key.to_lowercase();
    PIANO_KEY_TO_MIDI
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, midi)| *midi)
}

/// Returns the instrument keys in layout order.
pub fn instrument_keys() -> impl Iterator<Item = (&'static str, NoteName)> {
    PIANO_KEY_TO_MIDI
        .iter()
        .map(|(key, midi)| (*key, midi_to_note(*midi)))
}

/// Returns the trainer keys in layout order.
pub fn trainer_keys() -> impl Iterator<Item = (&'static str, NoteName)> {
    TRAINER_KEYS
        .iter()
        .filter_map(|(key, note)| parse_note(note).map(|note| (*key, note)))
}

/// Returns the parsed trainer note pool.
pub fn note_pool() -> Vec<NoteName> {
    NOTE_POOL.iter().filter_map(|note| parse_note(note)).collect()
}

/// Clamps an octave shift into the supported range.
pub fn clamp_octave_shift(shift: i8) -> i8 {
    shift.clamp(OCTAVE_SHIFT_MIN, OCTAVE_SHIFT_MAX)
}

/// Resolves an instrument key under the given octave shift. The shift is
/// clamped first and the transposed MIDI number is clamped to 0..=127.
pub fn assign(key: &str, octave_shift: i8) -> Option<PitchAssignment> {
    let base = key_to_midi(key)?;
    let shift = clamp_octave_shift(octave_shift) as i32;
    let midi_number = (base + shift * 12).clamp(MIDI_MIN, MIDI_MAX);
    Some(PitchAssignment {
        midi_number,
        note_name: midi_to_note(midi_number),
    })
}
