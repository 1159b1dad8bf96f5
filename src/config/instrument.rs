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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::ConfigError;
use crate::audio::synth::Envelope;

const DEFAULT_VOLUME: f32 = 0.2;

/// Sound settings for the tone engine.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Instrument {
    /// Directory holding the piano sample set. The piano timbre falls back to
    /// the synth when unset.
    piano_samples: Option<PathBuf>,

    /// Initial master volume, 0 to 1 (default: 0.2)
    volume: Option<f32>,

    /// Synth envelope. Durations use duration strings, e.g. "150ms".
    attack: Option<String>,
    decay: Option<String>,
    sustain: Option<f32>,
    release: Option<String>,
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::Duration {
                field,
                reason: e.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}

impl Instrument {
    /// Returns the piano sample directory, if configured.
    pub fn piano_samples(&self) -> Option<&Path> {
        self.piano_samples.as_deref()
    }

    /// Returns the initial master volume, clamped to 0..=1.
    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(DEFAULT_VOLUME).clamp(0.0, 1.0)
    }

    /// Returns the synth envelope, filling unset stages with the defaults.
    pub fn envelope(&self) -> Result<Envelope, ConfigError> {
        let default = Envelope::default();
        Ok(Envelope {
            attack: parse_duration("attack", &self.attack, default.attack)?,
            decay: parse_duration("decay", &self.decay, default.decay)?,
            sustain: self.sustain.unwrap_or(default.sustain).clamp(0.0, 1.0),
            release: parse_duration("release", &self.release, default.release)?,
        })
    }
}
