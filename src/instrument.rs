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
use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info};

use crate::{
    input::InputEvent,
    pitch::{self, NoteName},
    tone::{choose_voice, Sound, VoiceKind},
};

/// Key that shifts the instrument down an octave.
pub const OCTAVE_DOWN_KEY: &str = "z";

/// Key that shifts the instrument up an octave.
pub const OCTAVE_UP_KEY: &str = "x";

/// A note sounding because its key is held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveVoice {
    pub physical_key: String,
    pub midi_number: i32,
    pub note_name: NoteName,
    pub voice_kind: VoiceKind,
}

/// Tracks held keys and turns key presses into attacks and releases.
pub struct Instrument {
    sound: Arc<dyn Sound>,
    held: HashMap<String, ActiveVoice>,
    octave_shift: i8,
}

impl Instrument {
    pub fn new(sound: Arc<dyn Sound>) -> Instrument {
        Instrument {
            sound,
            held: HashMap::new(),
            octave_shift: 0,
        }
    }

    /// Starts the note for the given key. Held and unmapped keys are ignored.
    /// Returns true if a note was attacked.
    pub fn key_down(&mut self, key: &str) -> bool {
        let key = key.to_lowercase();
        if self.held.contains_key(&key) {
            return false;
        }
        let Some(assignment) = pitch::assign(&key, self.octave_shift) else {
            return false;
        };

        let voice_kind = choose_voice(self.sound.timbre(), self.sound.sample_ready());
        self.sound.attack(voice_kind, assignment.note_name);
        debug!(key, note = %assignment.note_name, ?voice_kind, "Note on.");
        self.held.insert(
            key.clone(),
            ActiveVoice {
                physical_key: key,
                midi_number: assignment.midi_number,
                note_name: assignment.note_name,
                voice_kind,
            },
        );
        true
    }

    /// Releases the note started by the given key, as it was recorded at key
    /// down. Returns true if a note was released.
    pub fn key_up(&mut self, key: &str) -> bool {
        match self.held.remove(&key.to_lowercase()) {
            Some(voice) => {
                self.sound.release(voice.voice_kind, voice.note_name);
                debug!(key = voice.physical_key, note = %voice.note_name, "Note off.");
                true
            }
            None => false,
        }
    }

    /// Sets the octave shift, clamped to -2..=2. Held notes are unaffected.
    pub fn set_octave_shift(&mut self, shift: i8) {
        self.octave_shift = pitch::clamp_octave_shift(shift);
        info!(octave_shift = self.octave_shift, "Octave shift set.");
    }

    /// Moves the octave shift by the given number of octaves.
    pub fn shift_octave(&mut self, delta: i8) {
        self.set_octave_shift(self.octave_shift.saturating_add(delta));
    }

    pub fn octave_shift(&self) -> i8 {
        self.octave_shift
    }

    /// Releases every held note. Returns how many were released.
    pub fn panic(&mut self) -> usize {
        let count = self.held.len();
        for (_, voice) in self.held.drain() {
            self.sound.release(voice.voice_kind, voice.note_name);
        }
        if count > 0 {
            info!(released = count, "Released all held notes.");
        }
        count
    }

    /// Returns the held keys, sorted.
    pub fn held_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.held.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn active_voice(&self, key: &str) -> Option<&ActiveVoice> {
        self.held.get(&key.to_lowercase())
    }

    /// Applies a raw input event.
    pub fn handle(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown { repeat: true, .. } => {}
            InputEvent::KeyDown { key, .. } => match key.to_lowercase().as_str() {
                OCTAVE_DOWN_KEY => self.shift_octave(-1),
                OCTAVE_UP_KEY => self.shift_octave(1),
                key => {
                    self.key_down(key);
                }
            },
            InputEvent::PointerDown { key } => {
                self.key_down(key);
            }
            InputEvent::KeyUp { key }
            | InputEvent::PointerUp { key }
            | InputEvent::PointerCancel { key }
            | InputEvent::PointerLeave { key } => {
                self.key_up(key);
            }
            InputEvent::Blur | InputEvent::VisibilityHidden => {
                self.panic();
            }
        }
    }
}

impl Drop for Instrument {
    fn drop(&mut self) {
        self.panic();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testutil::{RecordingSound, SoundEvent},
        tone::Timbre,
    };

    fn note(name: &str) -> NoteName {
        name.parse().unwrap()
    }

    fn instrument() -> (Instrument, Arc<RecordingSound>) {
        let sound = Arc::new(RecordingSound::new());
        (Instrument::new(sound.clone()), sound)
    }

    #[test]
    fn test_no_double_trigger() {
        let (mut instrument, sound) = instrument();
        assert!(instrument.key_down("a"));
        assert!(!instrument.key_down("a"));
        assert!(!instrument.key_down("A"));
        assert_eq!(
            vec![SoundEvent::Attack(VoiceKind::Synth, note("C4"))],
            sound.take()
        );

        assert!(instrument.key_up("a"));
        assert!(!instrument.key_up("a"));
        assert_eq!(
            vec![SoundEvent::Release(VoiceKind::Synth, note("C4"))],
            sound.take()
        );
    }

    #[test]
    fn test_unmapped_keys() {
        let (mut instrument, sound) = instrument();
        assert!(!instrument.key_down("q"));
        assert!(!instrument.key_up("q"));
        assert!(sound.take().is_empty());
    }

    #[test]
    fn test_release_uses_recorded_note() {
        let (mut instrument, sound) = instrument();
        instrument.key_down("a");
        instrument.shift_octave(1);
        sound.set_sample_ready(true);
        instrument.key_down("s");
        instrument.key_up("a");
        instrument.key_up("s");

        assert_eq!(
            vec![
                SoundEvent::Attack(VoiceKind::Synth, note("C4")),
                SoundEvent::Attack(VoiceKind::Sampler, note("D5")),
                SoundEvent::Release(VoiceKind::Synth, note("C4")),
                SoundEvent::Release(VoiceKind::Sampler, note("D5")),
            ],
            sound.take()
        );
    }

    #[test]
    fn test_voice_choice_follows_timbre() {
        let (mut instrument, sound) = instrument();
        sound.set_sample_ready(true);
        sound.set_timbre(Timbre::Triangle);
        instrument.key_down("a");
        assert_eq!(
            VoiceKind::Synth,
            instrument.active_voice("a").unwrap().voice_kind
        );
    }

    #[test]
    fn test_octave_shift_is_clamped() {
        let (mut instrument, sound) = instrument();
        for _ in 0..5 {
            instrument.shift_octave(1);
        }
        assert_eq!(2, instrument.octave_shift());
        instrument.set_octave_shift(-9);
        assert_eq!(-2, instrument.octave_shift());

        instrument.key_down("a");
        let voice = instrument.active_voice("a").unwrap();
        assert_eq!(36, voice.midi_number);
        assert_eq!(
            vec![SoundEvent::Attack(VoiceKind::Synth, note("C2"))],
            sound.take()
        );
    }

    #[test]
    fn test_panic_is_idempotent() {
        let (mut instrument, sound) = instrument();
        instrument.key_down("a");
        instrument.key_down("d");
        assert_eq!(vec!["a", "d"], instrument.held_keys());

        assert_eq!(2, instrument.panic());
        assert_eq!(0, instrument.panic());
        assert!(instrument.held_keys().is_empty());

        let releases = sound
            .take()
            .into_iter()
            .filter(|event| matches!(event, SoundEvent::Release(..)))
            .count();
        assert_eq!(2, releases);
    }

    #[test]
    fn test_handle_events() {
        let (mut instrument, sound) = instrument();
        instrument.handle(&InputEvent::key_down("x"));
        instrument.handle(&InputEvent::KeyDown {
            key: "x".to_string(),
            repeat: true,
        });
        assert_eq!(1, instrument.octave_shift());

        instrument.handle(&InputEvent::key_down("a"));
        instrument.handle(&InputEvent::KeyDown {
            key: "a".to_string(),
            repeat: true,
        });
        instrument.handle(&InputEvent::PointerDown {
            key: "k".to_string(),
        });
        instrument.handle(&InputEvent::PointerLeave {
            key: "k".to_string(),
        });
        instrument.handle(&InputEvent::Blur);
        instrument.handle(&InputEvent::key_up("a"));

        assert_eq!(
            vec![
                SoundEvent::Attack(VoiceKind::Synth, note("C5")),
                SoundEvent::Attack(VoiceKind::Synth, note("C6")),
                SoundEvent::Release(VoiceKind::Synth, note("C6")),
                SoundEvent::Release(VoiceKind::Synth, note("C5")),
            ],
            sound.take()
        );
    }

    #[test]
    fn test_drop_releases_held_notes() {
        let (mut instrument, sound) = instrument();
        instrument.key_down("a");
        drop(instrument);
        assert_eq!(
            vec![
                SoundEvent::Attack(VoiceKind::Synth, note("C4")),
                SoundEvent::Release(VoiceKind::Synth, note("C4")),
            ],
            sound.take()
        );
    }
}
