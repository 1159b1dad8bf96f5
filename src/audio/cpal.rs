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
use std::{
    fmt,
    sync::{mpsc, Arc},
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use crate::{
    audio::{AudioError, Device as AudioDevice, Mixer},
    config,
};

/// A handle on the thread that owns a running cpal stream.
struct RunningStream {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The output channel count of the device's default configuration.
    channels: u16,
    /// The sample rate requested by the configuration.
    sample_rate: u32,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Present while the output stream is running.
    stream: Mutex<Option<RunningStream>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

/// Output callback for devices that take floats directly.
fn create_f32_callback(
    mixer: Arc<Mixer>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        mixer.render(data);
    }
}

/// Output callback for integer devices: render floats and convert.
fn create_converting_callback<T: cpal::Sample + cpal::FromSample<f32>>(
    mixer: Arc<Mixer>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        scratch.resize(data.len(), 0.0);
        mixer.render(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

/// Builds and plays the output stream. Must run on the thread that will own
/// the stream.
fn build_stream(device: &cpal::Device, mixer: Arc<Mixer>) -> Result<cpal::Stream, AudioError> {
    let sample_format = device.default_output_config()?.sample_format();
    let config = cpal::StreamConfig {
        channels: mixer.num_channels(),
        sample_rate: mixer.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let on_error = |err: cpal::StreamError| error!("CPAL output stream error: {}", err);

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            create_f32_callback(mixer),
            on_error,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            create_converting_callback::<i16>(mixer),
            on_error,
            None,
        )?,
        cpal::SampleFormat::I32 => device.build_output_stream(
            &config,
            create_converting_callback::<i32>(mixer),
            on_error,
            None,
        )?,
        format => return Err(AudioError::UnsupportedFormat(format.to_string())),
    };
    stream.play()?;
    Ok(stream)
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, AudioError> {
        Ok(Device::list_cpal_devices(44100)?
            .into_iter()
            .map(|device| {
                let device: Box<dyn AudioDevice> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that can produce output.
    fn list_cpal_devices(sample_rate: u32) -> Result<Vec<Device>, AudioError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = match cpal::host_from_id(host_id) {
                Ok(host) => host,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to open host"
                    );
                    continue;
                }
            };
            let host_devices = match host.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_config) = device.default_output_config() else {
                    continue;
                };
                if output_config.channels() == 0 {
                    continue;
                }

                devices.push(Device {
                    name: device.name()?,
                    channels: output_config.channels(),
                    sample_rate,
                    host_id,
                    device,
                    stream: Mutex::new(None),
                });
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device. The name "default" picks the default output
    /// device of the default host.
    pub fn get(config: &config::Audio) -> Result<Device, AudioError> {
        let name = config.device();
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))?;
            let output_config = device.default_output_config()?;
            return Ok(Device {
                name: device.name()?,
                channels: output_config.channels(),
                sample_rate: config.sample_rate(),
                host_id: host.id(),
                device,
                stream: Mutex::new(None),
            });
        }

        Device::list_cpal_devices(config.sample_rate())?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }
}

impl AudioDevice for Device {
    fn start(&self, mixer: Arc<Mixer>) -> Result<(), AudioError> {
        let mut stream = self.stream.lock();
        if stream.is_some() {
            return Ok(());
        }

        let span = span!(Level::INFO, "output stream (cpal)");
        let _enter = span.enter();

        // cpal streams are not Send on every platform, so the stream lives on
        // its own thread until told to stop.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let device = self.device.clone();
        let handle = thread::spawn(move || match build_stream(&device, mixer) {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                // Either a stop signal or a dropped sender ends the stream.
                let _ = stop_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = self.name,
                    sample_rate = self.sample_rate,
                    channels = self.channels,
                    "Output stream started."
                );
                *stream = Some(RunningStream { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::Unavailable(
                    "output thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    fn stop(&self) {
        if let Some(running) = self.stream.lock().take() {
            let _ = running.stop_tx.send(());
            if running.handle.join().is_err() {
                error!(device = self.name, "Output thread panicked.");
            }
            info!(device = self.name, "Output stream stopped.");
        }
    }

    fn is_running(&self) -> bool {
        self.stream.lock().is_some()
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, AudioError> {
        Err(AudioError::Host("not a mock".to_string()))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop();
    }
}
