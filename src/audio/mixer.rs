// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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
// Voice mixing shared by the cpal output thread and the mock device.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Identifies a voice inside the mixer.
pub type VoiceId = u64;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// A mono sound generator rendered one sample at a time.
pub trait Voice: Send {
    /// Produces the next sample. Called only while the voice is unfinished.
    fn next_sample(&mut self) -> f32;

    /// Moves the voice into its release stage. Voices without a sustain stage
    /// may ignore this.
    fn release(&mut self);

    /// Returns true once the voice has nothing left to play. Finished voices
    /// are dropped by the mixer.
    fn is_finished(&self) -> bool;
}

struct ActiveVoice {
    id: VoiceId,
    voice: Box<dyn Voice>,
}

/// A linear gain ramp, advanced once per frame.
struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
}

impl GainRamp {
    fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
        }
    }

    fn ramp_to(&mut self, target: f32, frames: u64) {
        self.target = target;
        if frames == 0 {
            self.current = target;
            self.step = 0.0;
        } else {
            self.step = (target - self.current) / frames as f32;
        }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        if self.step != 0.0 {
            self.current += self.step;
            let reached = (self.step > 0.0 && self.current >= self.target)
                || (self.step < 0.0 && self.current <= self.target);
            if reached {
                self.current = self.target;
                self.step = 0.0;
            }
        }
        self.current
    }
}

struct MixerState {
    voices: Vec<ActiveVoice>,
    gain: GainRamp,
}

/// Sums every active voice through a master gain into interleaved frames.
pub struct Mixer {
    state: Mutex<MixerState>,
    /// Number of output channels. Voices are mono and copied to each channel.
    num_channels: u16,
    sample_rate: u32,
}

impl Mixer {
    /// Creates a new mixer with the given master gain.
    pub fn new(num_channels: u16, sample_rate: u32, gain: f32) -> Self {
        Self {
            state: Mutex::new(MixerState {
                voices: Vec::new(),
                gain: GainRamp::new(gain.clamp(0.0, 1.0)),
            }),
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    /// Adds a voice and returns its ID.
    pub fn add_voice(&self, voice: Box<dyn Voice>) -> VoiceId {
        let id = NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed);
        self.state.lock().voices.push(ActiveVoice { id, voice });
        id
    }

    /// Releases the voice with the given ID. Returns false if the voice is
    /// no longer playing.
    pub fn release_voice(&self, id: VoiceId) -> bool {
        let mut state = self.state.lock();
        match state.voices.iter_mut().find(|v| v.id == id) {
            Some(active) => {
                active.voice.release();
                true
            }
            None => false,
        }
    }

    /// Drops every voice immediately. Returns how many were playing.
    pub fn stop_all(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.voices.len();
        state.voices.clear();
        count
    }

    /// Ramps the master gain to the target over the given time.
    pub fn ramp_gain(&self, target: f32, over: Duration) {
        let frames = (over.as_secs_f64() * self.sample_rate as f64).round() as u64;
        self.state.lock().gain.ramp_to(target.clamp(0.0, 1.0), frames);
    }

    /// Returns the gain the master is ramping towards.
    pub fn target_gain(&self) -> f32 {
        self.state.lock().gain.target
    }

    /// Returns the number of voices still sounding.
    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mixes into an interleaved output buffer, overwriting its contents.
    pub fn render(&self, output: &mut [f32]) {
        let channels = self.num_channels as usize;
        let mut state = self.state.lock();
        let MixerState { voices, gain } = &mut *state;

        for frame in output.chunks_mut(channels) {
            let mut sum = 0.0f32;
            for active in voices.iter_mut() {
                if !active.voice.is_finished() {
                    sum += active.voice.next_sample();
                }
            }
            let sample = (sum * gain.next()).clamp(-1.0, 1.0);
            frame.fill(sample);
        }

        voices.retain(|active| !active.voice.is_finished());
    }

    /// Renders the given number of frames into a new buffer.
    pub fn render_frames(&self, num_frames: usize) -> Vec<f32> {
        let mut output = vec![0.0f32; num_frames * self.num_channels as usize];
        self.render(&mut output);
        output
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("active_voices", &self.active_voices())
            .field("num_channels", &self.num_channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plays a constant value for a fixed number of samples.
    struct ConstantVoice {
        value: f32,
        remaining: usize,
        released: bool,
    }

    impl ConstantVoice {
        fn boxed(value: f32, remaining: usize) -> Box<dyn Voice> {
            Box::new(ConstantVoice {
                value,
                remaining,
                released: false,
            })
        }
    }

    impl Voice for ConstantVoice {
        fn next_sample(&mut self) -> f32 {
            self.remaining = self.remaining.saturating_sub(1);
            self.value
        }

        fn release(&mut self) {
            self.released = true;
            self.remaining = 0;
        }

        fn is_finished(&self) -> bool {
            self.remaining == 0
        }
    }

    #[test]
    fn test_basic_mixing() {
        let mixer = Mixer::new(2, 44100, 1.0);
        mixer.add_voice(ConstantVoice::boxed(0.25, 10));
        mixer.add_voice(ConstantVoice::boxed(0.5, 10));

        let frames = mixer.render_frames(2);
        assert_eq!(vec![0.75, 0.75, 0.75, 0.75], frames);
        assert_eq!(2, mixer.active_voices());
    }

    #[test]
    fn test_finished_voices_are_dropped() {
        let mixer = Mixer::new(1, 44100, 1.0);
        mixer.add_voice(ConstantVoice::boxed(0.5, 3));

        let frames = mixer.render_frames(5);
        assert_eq!(vec![0.5, 0.5, 0.5, 0.0, 0.0], frames);
        assert_eq!(0, mixer.active_voices());
    }

    #[test]
    fn test_release_and_stop() {
        let mixer = Mixer::new(1, 44100, 1.0);
        let id = mixer.add_voice(ConstantVoice::boxed(0.5, 100));
        mixer.add_voice(ConstantVoice::boxed(0.5, 100));

        assert!(mixer.release_voice(id));
        mixer.render_frames(1);
        assert_eq!(1, mixer.active_voices());
        assert!(!mixer.release_voice(id));

        assert_eq!(1, mixer.stop_all());
        assert_eq!(0, mixer.stop_all());
    }

    #[test]
    fn test_gain_ramp() {
        // 100 Hz sample rate makes a 20ms ramp two frames long.
        let mixer = Mixer::new(1, 100, 0.0);
        mixer.add_voice(ConstantVoice::boxed(1.0, 1000));

        mixer.ramp_gain(1.0, Duration::from_millis(20));
        assert_eq!(1.0, mixer.target_gain());
        let frames = mixer.render_frames(4);
        assert_eq!(vec![0.5, 1.0, 1.0, 1.0], frames);

        mixer.ramp_gain(2.0, Duration::ZERO);
        assert_eq!(1.0, mixer.target_gain());
    }

    #[test]
    fn test_output_is_clamped() {
        let mixer = Mixer::new(1, 44100, 1.0);
        mixer.add_voice(ConstantVoice::boxed(0.8, 10));
        mixer.add_voice(ConstantVoice::boxed(0.8, 10));
        assert_eq!(vec![1.0], mixer.render_frames(1));
    }
}
