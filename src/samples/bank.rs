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
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::loader::{load_mono, SampleLoadError};
use crate::audio::Voice;
use crate::pitch::note_to_midi;

/// The Salamander grand piano set: one recording every minor third from A0 to
/// C8. Sharps are spelled "s" in the file names.
pub const SALAMANDER_SAMPLES: [(&str, &str); 30] = [
    ("A0", "A0"),
    ("C1", "C1"),
    ("D#1", "Ds1"),
    ("F#1", "Fs1"),
    ("A1", "A1"),
    ("C2", "C2"),
    ("D#2", "Ds2"),
    ("F#2", "Fs2"),
    ("A2", "A2"),
    ("C3", "C3"),
    ("D#3", "Ds3"),
    ("F#3", "Fs3"),
    ("A3", "A3"),
    ("C4", "C4"),
    ("D#4", "Ds4"),
    ("F#4", "Fs4"),
    ("A4", "A4"),
    ("C5", "C5"),
    ("D#5", "Ds5"),
    ("F#5", "Fs5"),
    ("A5", "A5"),
    ("C6", "C6"),
    ("D#6", "Ds6"),
    ("F#6", "Fs6"),
    ("A6", "A6"),
    ("C7", "C7"),
    ("D#7", "Ds7"),
    ("F#7", "Fs7"),
    ("A7", "A7"),
    ("C8", "C8"),
];

/// Extensions tried, in order, for each sample file.
const EXTENSIONS: [&str; 4] = ["mp3", "ogg", "flac", "wav"];

/// How long a released piano note takes to fade out.
const RELEASE: Duration = Duration::from_millis(1200);

struct PianoSample {
    midi: i32,
    data: Arc<Vec<f32>>,
}

/// Decoded piano samples, ready to be pitched to any note.
pub struct SampleBank {
    /// Sorted by MIDI number.
    samples: Vec<PianoSample>,
    sample_rate: u32,
}

fn find_sample_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
}

impl SampleBank {
    /// Loads the full sample set from the given directory. Fails if any file
    /// is missing or undecodable.
    pub fn load(dir: &Path, sample_rate: u32) -> Result<SampleBank, SampleLoadError> {
        let start = Instant::now();
        let mut samples = Vec::with_capacity(SALAMANDER_SAMPLES.len());
        for (note, stem) in SALAMANDER_SAMPLES {
            let path = find_sample_file(dir, stem)
                .ok_or_else(|| SampleLoadError::Missing(format!("{}/{}", dir.display(), stem)))?;
            let midi = note_to_midi(note).ok_or_else(|| SampleLoadError::Missing(note.into()))?;
            debug!(note, path = ?path, "Loading piano sample");
            samples.push((midi, load_mono(&path, sample_rate)?));
        }

        let bank = SampleBank::from_samples(samples, sample_rate);
        info!(
            dir = ?dir,
            samples = bank.len(),
            memory_kb = bank.memory_size() / 1024,
            elapsed_ms = start.elapsed().as_millis(),
            "Piano samples loaded"
        );
        Ok(bank)
    }

    /// Builds a bank from already decoded mono samples at the given rate.
    pub fn from_samples(samples: Vec<(i32, Vec<f32>)>, sample_rate: u32) -> SampleBank {
        let mut samples: Vec<PianoSample> = samples
            .into_iter()
            .map(|(midi, data)| PianoSample {
                midi,
                data: Arc::new(data),
            })
            .collect();
        samples.sort_by_key(|sample| sample.midi);
        SampleBank {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples
            .iter()
            .map(|sample| sample.data.len() * std::mem::size_of::<f32>())
            .sum()
    }

    /// Returns the MIDI number of the sample closest to the given note. Ties
    /// go to the sample above.
    pub fn nearest(&self, midi: i32) -> Option<i32> {
        self.nearest_sample(midi).map(|sample| sample.midi)
    }

    fn nearest_sample(&self, midi: i32) -> Option<&PianoSample> {
        self.samples
            .iter()
            .min_by_key(|sample| ((sample.midi - midi).abs(), sample.midi < midi))
    }

    /// Creates a voice playing the given note from its nearest sample.
    pub fn voice(&self, midi: i32) -> Option<SamplerVoice> {
        let sample = self.nearest_sample(midi)?;
        Some(SamplerVoice::new(
            sample.data.clone(),
            2.0_f64.powf((midi - sample.midi) as f64 / 12.0),
            (RELEASE.as_secs_f64() * self.sample_rate as f64).round() as u64,
        ))
    }
}

/// Plays a shared sample buffer at a playback rate, fading out once released.
pub struct SamplerVoice {
    data: Arc<Vec<f32>>,
    position: f64,
    rate: f64,
    release_frames: u64,
    /// Frames elapsed since release.
    released: Option<u64>,
}

impl SamplerVoice {
    fn new(data: Arc<Vec<f32>>, rate: f64, release_frames: u64) -> Self {
        Self {
            data,
            position: 0.0,
            rate,
            release_frames,
            released: None,
        }
    }

    /// Playback rate relative to the recording.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Voice for SamplerVoice {
    fn next_sample(&mut self) -> f32 {
        let index = self.position.floor() as usize;
        let frac = self.position.fract() as f32;
        let s0 = self.data.get(index).copied().unwrap_or(0.0);
        let s1 = self.data.get(index + 1).copied().unwrap_or(0.0);
        self.position += self.rate;

        let gain = match self.released.as_mut() {
            Some(elapsed) => {
                let gain = 1.0 - *elapsed as f32 / self.release_frames as f32;
                *elapsed += 1;
                gain.max(0.0)
            }
            None => 1.0,
        };
        (s0 + (s1 - s0) * frac) * gain
    }

    fn release(&mut self) {
        if self.released.is_none() {
            self.released = Some(0);
        }
    }

    fn is_finished(&self) -> bool {
        self.position >= self.data.len() as f64
            || self
                .released
                .is_some_and(|elapsed| elapsed >= self.release_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::write_wav;

    #[test]
    fn test_nearest_sample() {
        let bank = SampleBank::from_samples(
            vec![(69, vec![0.0]), (60, vec![0.0]), (63, vec![0.0])],
            1000,
        );
        assert_eq!(Some(60), bank.nearest(60));
        assert_eq!(Some(60), bank.nearest(20));
        assert_eq!(Some(63), bank.nearest(62));
        // Equidistant between 63 and 69 picks the upper sample.
        assert_eq!(Some(69), bank.nearest(66));
        assert_eq!(Some(69), bank.nearest(127));

        assert_eq!(None, SampleBank::from_samples(vec![], 1000).nearest(60));
    }

    #[test]
    fn test_voice_pitch() {
        let bank = SampleBank::from_samples(vec![(60, vec![0.0; 10])], 1000);
        assert_eq!(1.0, bank.voice(60).unwrap().rate());
        assert!((bank.voice(72).unwrap().rate() - 2.0).abs() < 1e-12);
        assert!((bank.voice(57).unwrap().rate() - 0.840_896).abs() < 1e-6);
    }

    #[test]
    fn test_voice_plays_and_fades() {
        let bank = SampleBank::from_samples(vec![(60, vec![1.0; 5000])], 1000);

        // An octave up plays through the sample twice as fast.
        let mut voice = bank.voice(72).unwrap();
        let mut played = 0;
        while !voice.is_finished() {
            voice.next_sample();
            played += 1;
        }
        assert_eq!(2500, played);

        let mut voice = bank.voice(60).unwrap();
        assert_eq!(1.0, voice.next_sample());
        voice.release();
        assert_eq!(1.0, voice.next_sample());
        let mut fade = vec![];
        while !voice.is_finished() {
            fade.push(voice.next_sample());
        }
        assert_eq!(1199, fade.len());
        assert!(fade.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_load_complete_set() {
        let dir = tempfile::tempdir().unwrap();
        for (_, stem) in SALAMANDER_SAMPLES {
            write_wav(&dir.path().join(format!("{}.wav", stem)), 1, 8000, &[0; 16]);
        }

        let bank = SampleBank::load(dir.path(), 16000).unwrap();
        assert_eq!(30, bank.len());
        assert_eq!(16000, bank.sample_rate());
        assert_eq!(Some(21), bank.nearest(0));
        assert_eq!(Some(108), bank.nearest(127));
        assert_eq!(30 * 32 * 4, bank.memory_size());
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        for (_, stem) in SALAMANDER_SAMPLES.iter().skip(1) {
            write_wav(&dir.path().join(format!("{}.wav", stem)), 1, 8000, &[0; 16]);
        }

        assert!(matches!(
            SampleBank::load(dir.path(), 8000),
            Err(SampleLoadError::Missing(_))
        ));
    }
}
