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
// The tone engine: master gain, synth and sampled piano voices, and one-shot
// feedback cues, all rendered through a single mixer on the output device.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    path::PathBuf,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, span, warn, Instrument, Level};

use crate::{
    audio::{
        synth::{CueShape, CueVoice, Envelope, SynthVoice, Waveform},
        AudioError, Device, Mixer, Voice, VoiceId,
    },
    config,
    pitch::NoteName,
    samples::SampleBank,
};

/// How long master volume changes take.
const VOLUME_RAMP: Duration = Duration::from_millis(20);

/// The sound selected for the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timbre {
    #[default]
    Piano,
    Sine,
    Triangle,
}

impl fmt::Display for Timbre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Timbre::Piano => "piano",
            Timbre::Sine => "sine",
            Timbre::Triangle => "triangle",
        })
    }
}

/// Error returned when a string is not a timbre.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown timbre '{0}', expected piano, sine or triangle")]
pub struct TimbreParseError(String);

impl FromStr for Timbre {
    type Err = TimbreParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "piano" => Ok(Timbre::Piano),
            "sine" => Ok(Timbre::Sine),
            "triangle" => Ok(Timbre::Triangle),
            _ => Err(TimbreParseError(s.to_string())),
        }
    }
}

impl Timbre {
    /// The oscillator shape the synth uses for this timbre.
    pub fn synth_waveform(&self) -> Waveform {
        match self {
            Timbre::Piano | Timbre::Sine => Waveform::Sine,
            Timbre::Triangle => Waveform::Triangle,
        }
    }
}

/// The voice source a note is played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceKind {
    Sampler,
    Synth,
}

/// Picks the voice source for an attack: the sampler only when the piano is
/// selected and its samples are loaded.
pub fn choose_voice(timbre: Timbre, sample_ready: bool) -> VoiceKind {
    if timbre == Timbre::Piano && sample_ready {
        VoiceKind::Sampler
    } else {
        VoiceKind::Synth
    }
}

/// A short feedback sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Success,
    Fail,
    Note(NoteName),
}

impl Cue {
    pub fn shape(&self) -> CueShape {
        match self {
            Cue::Success => CueShape {
                waveform: Waveform::Sine,
                frequency: 880.0,
                duration: Duration::from_millis(180),
                peak: 0.1,
            },
            Cue::Fail => CueShape {
                waveform: Waveform::Square,
                frequency: 180.0,
                duration: Duration::from_millis(220),
                peak: 0.16,
            },
            Cue::Note(note) => CueShape {
                waveform: Waveform::Triangle,
                frequency: note.frequency(),
                duration: Duration::from_millis(220),
                peak: 0.12,
            },
        }
    }
}

/// Loading state of the sampled piano.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PianoStatus {
    /// No sample directory configured.
    Unconfigured,
    Loading,
    Loaded,
    Failed,
}

/// The sound operations the instrument and trainer drive.
pub trait Sound: Send + Sync {
    /// Returns true once audio output is unlocked.
    fn is_ready(&self) -> bool;

    /// Returns true once the piano samples are usable.
    fn sample_ready(&self) -> bool;

    fn timbre(&self) -> Timbre;

    /// Begins sustaining the given note.
    fn attack(&self, kind: VoiceKind, note: NoteName);

    /// Ends one sustain of the given note.
    fn release(&self, kind: VoiceKind, note: NoteName);

    /// Plays a one-shot cue.
    fn play_cue(&self, cue: Cue);
}

struct Piano {
    status: PianoStatus,
    bank: Option<Arc<SampleBank>>,
}

/// Renders notes and cues through an output device.
pub struct ToneEngine {
    device: Arc<dyn Device>,
    mixer: Arc<Mixer>,
    envelope: Envelope,
    piano_samples: Option<PathBuf>,
    timbre: RwLock<Timbre>,
    volume: RwLock<f32>,
    piano: Arc<RwLock<Piano>>,
    /// Sustained voices by source and MIDI number, oldest first.
    held: Mutex<HashMap<(VoiceKind, i32), VecDeque<VoiceId>>>,
    started: tokio::sync::OnceCell<()>,
    ready: AtomicBool,
    disposed: AtomicBool,
}

impl ToneEngine {
    /// Creates an engine for the given device. Nothing is audible until
    /// start() succeeds.
    pub fn new(
        device: Arc<dyn Device>,
        config: &config::Instrument,
    ) -> Result<ToneEngine, config::ConfigError> {
        let volume = config.volume();
        Ok(ToneEngine {
            mixer: Arc::new(Mixer::new(device.channels(), device.sample_rate(), volume)),
            device,
            envelope: config.envelope()?,
            piano_samples: config.piano_samples().map(|path| path.to_path_buf()),
            timbre: RwLock::new(Timbre::default()),
            volume: RwLock::new(volume),
            piano: Arc::new(RwLock::new(Piano {
                status: PianoStatus::Unconfigured,
                bank: None,
            })),
            held: Mutex::new(HashMap::new()),
            started: tokio::sync::OnceCell::new(),
            ready: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }

    /// Unlocks audio output. Concurrent calls share one attempt, later calls
    /// return immediately, and a failed attempt may be retried. The first
    /// success starts loading the piano samples in the background.
    pub async fn start(&self) -> Result<(), AudioError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(AudioError::Disposed);
        }

        self.started
            .get_or_try_init(|| {
                async {
                    let device = self.device.clone();
                    let mixer = self.mixer.clone();
                    tokio::task::spawn_blocking(move || device.start(mixer))
                        .await
                        .map_err(|e| AudioError::Unavailable(e.to_string()))??;

                    if self.disposed.load(Ordering::Acquire) {
                        self.device.stop();
                        return Err(AudioError::Disposed);
                    }
                    self.ready.store(true, Ordering::Release);
                    info!(device = self.device.to_string(), "Audio unlocked.");
                    self.load_piano();
                    Ok::<(), AudioError>(())
                }
                .instrument(span!(Level::INFO, "start audio"))
            })
            .await?;
        Ok(())
    }

    fn load_piano(&self) {
        let Some(dir) = self.piano_samples.clone() else {
            return;
        };

        self.piano.write().status = PianoStatus::Loading;
        let piano = self.piano.clone();
        let sample_rate = self.mixer.sample_rate();
        tokio::task::spawn_blocking(move || match SampleBank::load(&dir, sample_rate) {
            Ok(bank) => {
                let mut piano = piano.write();
                piano.bank = Some(Arc::new(bank));
                piano.status = PianoStatus::Loaded;
            }
            Err(e) => {
                warn!(err = %e, dir = ?dir, "Unable to load piano samples, using the synth.");
                piano.write().status = PianoStatus::Failed;
            }
        });
    }

    pub fn piano_status(&self) -> PianoStatus {
        self.piano.read().status
    }

    /// Sets the master volume, clamped to 0..=1, ramping over 20ms.
    pub fn set_master_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        *self.volume.write() = volume;
        self.mixer.ramp_gain(volume, VOLUME_RAMP);
        debug!(volume, "Master volume set.");
    }

    pub fn volume(&self) -> f32 {
        *self.volume.read()
    }

    /// Selects the timbre for future attacks.
    pub fn set_timbre(&self, timbre: Timbre) {
        *self.timbre.write() = timbre;
        debug!(%timbre, "Timbre set.");
    }

    /// Returns the number of voices still sounding.
    pub fn active_voices(&self) -> usize {
        self.mixer.active_voices()
    }

    /// Silences everything and releases the output device. Safe to call more
    /// than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.ready.store(false, Ordering::Release);
        self.held.lock().clear();
        let silenced = self.mixer.stop_all();
        self.device.stop();
        info!(silenced, "Tone engine disposed.");
    }
}

impl Sound for ToneEngine {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn sample_ready(&self) -> bool {
        self.piano.read().status == PianoStatus::Loaded
    }

    fn timbre(&self) -> Timbre {
        *self.timbre.read()
    }

    fn attack(&self, kind: VoiceKind, note: NoteName) {
        if !self.is_ready() {
            debug!(%note, "Audio not ready, ignoring attack.");
            return;
        }

        let midi = note.midi();
        let voice: Box<dyn Voice> = match kind {
            VoiceKind::Sampler => {
                let bank = self.piano.read().bank.clone();
                match bank.and_then(|bank| bank.voice(midi)) {
                    Some(voice) => Box::new(voice),
                    None => {
                        debug!(%note, "Piano samples unavailable, ignoring attack.");
                        return;
                    }
                }
            }
            VoiceKind::Synth => Box::new(SynthVoice::new(
                self.timbre().synth_waveform(),
                note.frequency(),
                &self.envelope,
                self.mixer.sample_rate(),
            )),
        };

        let id = self.mixer.add_voice(voice);
        self.held
            .lock()
            .entry((kind, midi))
            .or_default()
            .push_back(id);
        debug!(%note, ?kind, "Attack.");
    }

    fn release(&self, kind: VoiceKind, note: NoteName) {
        let midi = note.midi();
        let id = {
            let mut held = self.held.lock();
            let Some(ids) = held.get_mut(&(kind, midi)) else {
                return;
            };
            let id = ids.pop_front();
            if ids.is_empty() {
                held.remove(&(kind, midi));
            }
            id
        };

        if let Some(id) = id {
            self.mixer.release_voice(id);
            debug!(%note, ?kind, "Release.");
        }
    }

    fn play_cue(&self, cue: Cue) {
        if !self.is_ready() {
            return;
        }
        self.mixer.add_voice(Box::new(CueVoice::new(
            &cue.shape(),
            self.mixer.sample_rate(),
        )));
    }
}

impl Drop for ToneEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        audio::{self, mock},
        testutil::{eventually_async, write_wav},
    };

    fn engine(device: &str, config: config::Instrument) -> (ToneEngine, Arc<mock::Device>) {
        let device = audio::get_device(&config::Audio::new(device)).unwrap();
        let mock = device.to_mock().unwrap();
        (ToneEngine::new(device, &config).unwrap(), mock)
    }

    fn c4() -> NoteName {
        "C4".parse().unwrap()
    }

    #[test]
    fn test_choose_voice() {
        assert_eq!(VoiceKind::Sampler, choose_voice(Timbre::Piano, true));
        assert_eq!(VoiceKind::Synth, choose_voice(Timbre::Piano, false));
        assert_eq!(VoiceKind::Synth, choose_voice(Timbre::Sine, true));
        assert_eq!(VoiceKind::Synth, choose_voice(Timbre::Triangle, false));
    }

    #[test]
    fn test_timbre() {
        for timbre in [Timbre::Piano, Timbre::Sine, Timbre::Triangle] {
            assert_eq!(Ok(timbre), timbre.to_string().parse());
        }
        assert!("organ".parse::<Timbre>().is_err());
        assert_eq!(Waveform::Sine, Timbre::Piano.synth_waveform());
        assert_eq!(Waveform::Triangle, Timbre::Triangle.synth_waveform());
    }

    #[test]
    fn test_cue_shapes() {
        assert_eq!(880.0, Cue::Success.shape().frequency);
        assert_eq!(Waveform::Square, Cue::Fail.shape().waveform);
        let note = Cue::Note("A4".parse().unwrap()).shape();
        assert_eq!(440.0, note.frequency);
        assert_eq!(Duration::from_millis(220), note.duration);
    }

    #[tokio::test]
    async fn test_silent_until_started() {
        let (engine, mock) = engine("mock-device", config::Instrument::default());
        assert!(!engine.is_ready());

        engine.attack(VoiceKind::Synth, c4());
        engine.play_cue(Cue::Success);
        assert_eq!(0, engine.active_voices());

        engine.start().await.unwrap();
        engine.start().await.unwrap();
        assert!(engine.is_ready());
        assert_eq!(1, mock.start_count());
        assert_eq!(PianoStatus::Unconfigured, engine.piano_status());

        engine.attack(VoiceKind::Synth, c4());
        assert_eq!(1, engine.active_voices());
        assert!(mock.render(64).iter().any(|s| *s != 0.0));
    }

    #[tokio::test]
    async fn test_failed_start_can_be_retried() {
        let (engine, mock) = engine("mock-fail", config::Instrument::default());
        assert!(engine.start().await.is_err());
        assert!(engine.start().await.is_err());
        assert_eq!(2, mock.start_count());
        assert!(!engine.is_ready());
    }

    #[tokio::test]
    async fn test_release_oldest_first() {
        let (engine, mock) = engine("mock-device", config::Instrument::default());
        engine.start().await.unwrap();

        engine.attack(VoiceKind::Synth, c4());
        engine.attack(VoiceKind::Synth, c4());
        assert_eq!(2, engine.active_voices());

        engine.release(VoiceKind::Synth, c4());
        engine.release(VoiceKind::Synth, c4());
        // Nothing left to release.
        engine.release(VoiceKind::Synth, c4());
        engine.release(VoiceKind::Sampler, c4());

        // Both voices fade out over the release time.
        mock.render(44100 * 2);
        assert_eq!(0, engine.active_voices());
    }

    #[tokio::test]
    async fn test_sampler_without_samples_is_silent() {
        let (engine, _mock) = engine("mock-device", config::Instrument::default());
        engine.start().await.unwrap();
        assert!(!engine.sample_ready());
        engine.attack(VoiceKind::Sampler, c4());
        assert_eq!(0, engine.active_voices());
    }

    #[tokio::test]
    async fn test_cues_stop_by_themselves() {
        let (engine, mock) = engine("mock-device", config::Instrument::default());
        engine.start().await.unwrap();
        engine.play_cue(Cue::Fail);
        engine.play_cue(Cue::Note(c4()));
        assert_eq!(2, engine.active_voices());

        mock.render(44100);
        assert_eq!(0, engine.active_voices());
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let (engine, _mock) = engine("mock-device", config::Instrument::default());
        assert_eq!(0.2, engine.volume());
        engine.set_master_volume(1.5);
        assert_eq!(1.0, engine.volume());
        engine.set_master_volume(-1.0);
        assert_eq!(0.0, engine.volume());
    }

    #[tokio::test]
    async fn test_dispose() {
        let (engine, mock) = engine("mock-device", config::Instrument::default());
        engine.start().await.unwrap();
        engine.attack(VoiceKind::Synth, c4());

        engine.dispose();
        engine.dispose();
        assert!(!engine.is_ready());
        assert!(!mock.is_running());
        assert_eq!(0, engine.active_voices());
        assert!(matches!(engine.start().await, Err(AudioError::Disposed)));

        // Operations after dispose are no-ops.
        engine.attack(VoiceKind::Synth, c4());
        engine.release(VoiceKind::Synth, c4());
        assert_eq!(0, engine.active_voices());
    }

    #[tokio::test]
    async fn test_piano_loading() {
        let dir = tempfile::tempdir().unwrap();
        for (_, stem) in crate::samples::SALAMANDER_SAMPLES {
            write_wav(&dir.path().join(format!("{}.wav", stem)), 1, 44100, &[8192; 64]);
        }
        let config: config::Instrument =
            serde_json::from_value(serde_json::json!({ "piano_samples": dir.path() })).unwrap();

        let (engine, _mock) = engine("mock-device", config);
        engine.start().await.unwrap();
        eventually_async(
            || async { engine.piano_status() == PianoStatus::Loaded },
            "Piano never loaded",
        )
        .await;
        assert!(engine.sample_ready());

        let kind = choose_voice(engine.timbre(), engine.sample_ready());
        assert_eq!(VoiceKind::Sampler, kind);
        engine.attack(kind, c4());
        assert_eq!(1, engine.active_voices());
    }

    #[tokio::test]
    async fn test_piano_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config: config::Instrument =
            serde_json::from_value(serde_json::json!({ "piano_samples": dir.path() })).unwrap();

        let (engine, _mock) = engine("mock-device", config);
        engine.start().await.unwrap();
        eventually_async(
            || async { engine.piano_status() == PianoStatus::Failed },
            "Piano load never failed",
        )
        .await;
        assert_eq!(VoiceKind::Synth, choose_voice(Timbre::Piano, engine.sample_ready()));
    }
}
