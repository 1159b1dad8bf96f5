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
use std::any::Any;
use std::{fmt, sync::Arc};

use crate::config;

pub mod cpal;
mod error;
pub mod mixer;
pub mod mock;
pub mod synth;

pub use error::AudioError;
pub use mixer::{Mixer, Voice, VoiceId};

/// An output device that pulls audio from a mixer once started.
pub trait Device: Any + fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts pulling audio from the given mixer. Starting an already running
    /// device is a no-op.
    fn start(&self, mixer: Arc<Mixer>) -> Result<(), AudioError>;

    /// Stops the output and releases the underlying stream. Safe to call more
    /// than once.
    fn stop(&self);

    /// Returns true while the device is producing audio.
    fn is_running(&self) -> bool;

    /// Number of output channels the device renders.
    fn channels(&self) -> u16;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, AudioError>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, AudioError> {
    cpal::Device::list()
}

/// Gets the device named in the given configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, AudioError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, config.sample_rate())));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
