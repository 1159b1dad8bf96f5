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
// Oscillator voices: the sustained synth voice used by the instrument and the
// self-stopping cue voice used for feedback sounds.

use std::{f32::consts::TAU, fmt, str::FromStr, time::Duration};

use crate::audio::Voice;

/// Lowest level an exponential ramp can start from or end on.
const RAMP_FLOOR: f32 = 0.0001;

/// Basic oscillator shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Waveform::Sine => "sine",
            Waveform::Triangle => "triangle",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
        })
    }
}

/// Error returned when a string is not a waveform.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown waveform '{0}'")]
pub struct WaveformParseError(String);

impl FromStr for Waveform {
    type Err = WaveformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "triangle" => Ok(Waveform::Triangle),
            "square" => Ok(Waveform::Square),
            "sawtooth" => Ok(Waveform::Sawtooth),
            _ => Err(WaveformParseError(s.to_string())),
        }
    }
}

/// A phase accumulating oscillator.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    phase: f32,
    increment: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: u32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            increment: (frequency / sample_rate.max(1) as f64) as f32,
        }
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let p = self.phase;
        self.phase = (self.phase + self.increment).fract();
        match self.waveform {
            Waveform::Sine => (p * TAU).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * p - 1.0,
        }
    }
}

/// Attack, decay, sustain and release settings for a sustained voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: Duration,
    pub decay: Duration,
    /// Sustain level, 0 to 1.
    pub sustain: f32,
    pub release: Duration,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: Duration::from_millis(5),
            decay: Duration::from_millis(150),
            sustain: 0.35,
            release: Duration::from_millis(1200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Decay,
    Sustain,
    Release { from: f32 },
    Done,
}

/// Runs an envelope one sample at a time.
#[derive(Debug, Clone)]
struct EnvelopeState {
    attack: u64,
    decay: u64,
    release: u64,
    sustain: f32,
    stage: Stage,
    position: u64,
    level: f32,
}

fn frames(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_secs_f64() * sample_rate as f64).round() as u64
}

impl EnvelopeState {
    fn new(envelope: &Envelope, sample_rate: u32) -> Self {
        Self {
            attack: frames(envelope.attack, sample_rate),
            decay: frames(envelope.decay, sample_rate),
            release: frames(envelope.release, sample_rate),
            sustain: envelope.sustain.clamp(0.0, 1.0),
            stage: Stage::Attack,
            position: 0,
            level: 0.0,
        }
    }

    fn release(&mut self) {
        if !matches!(self.stage, Stage::Release { .. } | Stage::Done) {
            self.stage = Stage::Release { from: self.level };
            self.position = 0;
        }
    }

    fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    fn next(&mut self) -> f32 {
        self.level = match self.stage {
            Stage::Attack => {
                if self.position >= self.attack {
                    self.stage = Stage::Decay;
                    self.position = 0;
                    1.0
                } else {
                    (self.position + 1) as f32 / self.attack as f32
                }
            }
            Stage::Decay => {
                if self.position >= self.decay {
                    self.stage = Stage::Sustain;
                    self.sustain
                } else {
                    let t = self.position as f32 / self.decay as f32;
                    1.0 + (self.sustain - 1.0) * t
                }
            }
            Stage::Sustain => self.sustain,
            Stage::Release { from } => {
                if self.position >= self.release {
                    self.stage = Stage::Done;
                    0.0
                } else {
                    from * (1.0 - self.position as f32 / self.release as f32)
                }
            }
            Stage::Done => 0.0,
        };
        self.position += 1;
        self.level
    }
}

/// A sustained oscillator note shaped by an envelope.
pub struct SynthVoice {
    oscillator: Oscillator,
    envelope: EnvelopeState,
}

impl SynthVoice {
    pub fn new(waveform: Waveform, frequency: f64, envelope: &Envelope, sample_rate: u32) -> Self {
        Self {
            oscillator: Oscillator::new(waveform, frequency, sample_rate),
            envelope: EnvelopeState::new(envelope, sample_rate),
        }
    }
}

impl Voice for SynthVoice {
    fn next_sample(&mut self) -> f32 {
        self.oscillator.next_sample() * self.envelope.next()
    }

    fn release(&mut self) {
        self.envelope.release();
    }

    fn is_finished(&self) -> bool {
        self.envelope.is_done()
    }
}

/// Shape of a one-shot feedback tone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueShape {
    pub waveform: Waveform,
    pub frequency: f64,
    pub duration: Duration,
    pub peak: f32,
}

/// Time taken by a cue to reach its peak.
const CUE_RISE: Duration = Duration::from_millis(10);

/// Silence held after a cue's decay before it stops.
const CUE_TAIL: Duration = Duration::from_millis(20);

/// A one-shot tone: exponential rise to the peak, exponential fall until its
/// duration, then a short tail before it finishes by itself.
pub struct CueVoice {
    oscillator: Oscillator,
    peak: f32,
    rise: u64,
    fall_end: u64,
    stop: u64,
    position: u64,
}

impl CueVoice {
    pub fn new(shape: &CueShape, sample_rate: u32) -> Self {
        let fall_end = frames(shape.duration, sample_rate);
        Self {
            oscillator: Oscillator::new(shape.waveform, shape.frequency, sample_rate),
            peak: shape.peak.max(RAMP_FLOOR),
            rise: frames(CUE_RISE, sample_rate).min(fall_end),
            fall_end,
            stop: fall_end + frames(CUE_TAIL, sample_rate),
            position: 0,
        }
    }

    fn gain(&self) -> f32 {
        let exp_ramp = |from: f32, to: f32, t: f32| from * (to / from).powf(t.clamp(0.0, 1.0));
        if self.position < self.rise {
            exp_ramp(RAMP_FLOOR, self.peak, self.position as f32 / self.rise as f32)
        } else if self.position < self.fall_end {
            let span = (self.fall_end - self.rise) as f32;
            exp_ramp(
                self.peak,
                RAMP_FLOOR,
                (self.position - self.rise) as f32 / span,
            )
        } else {
            RAMP_FLOOR
        }
    }
}

impl Voice for CueVoice {
    fn next_sample(&mut self) -> f32 {
        let sample = self.oscillator.next_sample() * self.gain();
        self.position += 1;
        sample
    }

    /// Cues always play out.
    fn release(&mut self) {}

    fn is_finished(&self) -> bool {
        self.position >= self.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(voice: &mut dyn Voice, max: usize) -> Vec<f32> {
        let mut out = Vec::new();
        while !voice.is_finished() && out.len() < max {
            out.push(voice.next_sample());
        }
        out
    }

    #[test]
    fn test_waveforms() {
        // Quarter-cycle steps.
        let mut osc = Oscillator::new(Waveform::Square, 1.0, 4);
        assert_eq!(
            vec![1.0, 1.0, -1.0, -1.0],
            (0..4).map(|_| osc.next_sample()).collect::<Vec<_>>()
        );

        let mut osc = Oscillator::new(Waveform::Triangle, 1.0, 4);
        assert_eq!(
            vec![-1.0, 0.0, 1.0, 0.0],
            (0..4).map(|_| osc.next_sample()).collect::<Vec<_>>()
        );

        let mut osc = Oscillator::new(Waveform::Sine, 1.0, 4);
        let sine: Vec<f32> = (0..4).map(|_| osc.next_sample()).collect();
        assert!(sine[0].abs() < 1e-6);
        assert!((sine[1] - 1.0).abs() < 1e-6);

        assert_eq!(Ok(Waveform::Sawtooth), "Sawtooth".parse());
        assert_eq!(
            Err(WaveformParseError("noise".to_string())),
            "noise".parse::<Waveform>()
        );
        assert_eq!(
            "unknown waveform 'noise'",
            "noise".parse::<Waveform>().unwrap_err().to_string()
        );
    }

    #[test]
    fn test_synth_voice_sustains_until_released() {
        let envelope = Envelope {
            attack: Duration::from_millis(10),
            decay: Duration::from_millis(10),
            sustain: 0.5,
            release: Duration::from_millis(10),
        };
        let mut state = EnvelopeState::new(&envelope, 1000);
        let levels: Vec<f32> = (0..30).map(|_| state.next()).collect();
        assert_eq!(1.0, levels[9]);
        assert_eq!(0.5, levels[25]);
        assert!(!state.is_done());

        state.release();
        let release: Vec<f32> = (0..11).map(|_| state.next()).collect();
        assert_eq!(0.5, release[0]);
        assert_eq!(0.0, release[10]);
        assert!(state.is_done());
    }

    #[test]
    fn test_synth_voice_finishes_after_release() {
        let mut voice = SynthVoice::new(Waveform::Sine, 440.0, &Envelope::default(), 1000);
        assert_eq!(1000, run(&mut voice, 1000).len());
        voice.release();
        let tail = run(&mut voice, 10_000);
        assert_eq!(1201, tail.len());
        assert!(voice.is_finished());
    }

    #[test]
    fn test_cue_voice_stops_by_itself() {
        let shape = CueShape {
            waveform: Waveform::Square,
            frequency: 180.0,
            duration: Duration::from_millis(220),
            peak: 0.16,
        };
        let mut voice = CueVoice::new(&shape, 1000);
        voice.release();
        let samples = run(&mut voice, 10_000);
        assert_eq!(240, samples.len());

        let loudest = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
        assert!((loudest - 0.16).abs() < 0.01);
        assert!(samples[239].abs() <= RAMP_FLOOR);
    }
}
