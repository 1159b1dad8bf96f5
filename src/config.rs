// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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

use config::{Config, Environment, File};
use serde::Deserialize;

mod audio;
mod error;
mod instrument;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::instrument::Instrument;

/// Prefix for environment variable overrides, e.g. KEYNOTE_AUDIO__DEVICE.
const ENV_PREFIX: &str = "KEYNOTE";

/// The top level keynote configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Keynote {
    #[serde(default)]
    audio: Audio,

    #[serde(default)]
    instrument: Instrument,

    /// JSON file holding persisted settings. Settings are kept in memory when
    /// unset.
    settings_file: Option<PathBuf>,
}

impl Keynote {
    /// Loads the configuration from the optional YAML file, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Keynote, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Ok(builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Keynote>()?)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn set_audio(&mut self, audio: Audio) {
        self.audio = audio;
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn settings_file(&self) -> Option<&Path> {
        self.settings_file.as_deref()
    }
}
