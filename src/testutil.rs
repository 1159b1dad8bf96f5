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
use std::{
    fs::File,
    path::Path,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::{
    pitch::NoteName,
    tone::{Cue, Sound, Timbre, VoiceKind},
};

/// Wait for the given async predicate to return true or fail.
#[inline]
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Writes 16 bit interleaved samples to a wav file.
pub fn write_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
    let file = File::create(path).unwrap();
    let mut writer = WavWriter::new(
        file,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )
    .unwrap();
    for sample in samples {
        writer.write_sample(*sample).unwrap();
    }
    writer.finalize().unwrap();
}

/// A call made on a RecordingSound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEvent {
    Attack(VoiceKind, NoteName),
    Release(VoiceKind, NoteName),
    Cue(Cue),
}

/// A Sound that records every call instead of making noise.
pub struct RecordingSound {
    events: Mutex<Vec<SoundEvent>>,
    sample_ready: AtomicBool,
    timbre: Mutex<Timbre>,
}

impl RecordingSound {
    pub fn new() -> RecordingSound {
        RecordingSound {
            events: Mutex::new(Vec::new()),
            sample_ready: AtomicBool::new(false),
            timbre: Mutex::new(Timbre::Piano),
        }
    }

    pub fn set_sample_ready(&self, ready: bool) {
        self.sample_ready.store(ready, Ordering::Relaxed);
    }

    pub fn set_timbre(&self, timbre: Timbre) {
        *self.timbre.lock() = timbre;
    }

    /// Returns and clears the recorded events.
    pub fn take(&self) -> Vec<SoundEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Returns the recorded cues, leaving everything else in place.
    pub fn cues(&self) -> Vec<Cue> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SoundEvent::Cue(cue) => Some(*cue),
                _ => None,
            })
            .collect()
    }
}

impl Sound for RecordingSound {
    fn is_ready(&self) -> bool {
        true
    }

    fn sample_ready(&self) -> bool {
        self.sample_ready.load(Ordering::Relaxed)
    }

    fn timbre(&self) -> Timbre {
        *self.timbre.lock()
    }

    fn attack(&self, kind: VoiceKind, note: NoteName) {
        self.events.lock().push(SoundEvent::Attack(kind, note));
    }

    fn release(&self, kind: VoiceKind, note: NoteName) {
        self.events.lock().push(SoundEvent::Release(kind, note));
    }

    fn play_cue(&self, cue: Cue) {
        self.events.lock().push(SoundEvent::Cue(cue));
    }
}
