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
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::info;

use crate::audio::{AudioError, Mixer};

/// A mock device. Doesn't actually play anything, but holds on to the mixer
/// so tests can pull audio out of it.
#[derive(Clone)]
pub struct Device {
    name: String,
    sample_rate: u32,
    is_running: Arc<AtomicBool>,
    start_count: Arc<AtomicUsize>,
    mixer: Arc<Mutex<Option<Arc<Mixer>>>>,
}

impl Device {
    /// Gets the given mock device. A name containing "fail" produces a device
    /// that refuses to start.
    pub fn get(name: &str, sample_rate: u32) -> Device {
        Device {
            name: name.to_string(),
            sample_rate,
            is_running: Arc::new(AtomicBool::new(false)),
            start_count: Arc::new(AtomicUsize::new(0)),
            mixer: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the number of start attempts, including failed ones.
    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::Relaxed)
    }

    /// Renders the given number of frames from the attached mixer. Returns
    /// silence if the device isn't running.
    pub fn render(&self, num_frames: usize) -> Vec<f32> {
        match self.mixer.lock().as_ref() {
            Some(mixer) if self.is_running.load(Ordering::Relaxed) => {
                mixer.render_frames(num_frames)
            }
            _ => vec![0.0; num_frames],
        }
    }
}

impl crate::audio::Device for Device {
    fn start(&self, mixer: Arc<Mixer>) -> Result<(), AudioError> {
        self.start_count.fetch_add(1, Ordering::Relaxed);
        if self.name.contains("fail") {
            return Err(AudioError::Unavailable(format!(
                "mock device {} refused to start",
                self.name
            )));
        }
        if self.is_running.swap(true, Ordering::Relaxed) {
            return Ok(());
        }

        info!(device = self.name, "Output stream started (mock).");
        *self.mixer.lock() = Some(mixer);
        Ok(())
    }

    fn stop(&self) {
        if self.is_running.swap(false, Ordering::Relaxed) {
            info!(device = self.name, "Output stream stopped (mock).");
        }
        self.mixer.lock().take();
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, AudioError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
