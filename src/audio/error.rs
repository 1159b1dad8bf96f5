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

/// Errors raised while finding or driving an output device.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no output device found with name {0}")]
    DeviceNotFound(String),

    #[error("audio output is unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(String),

    #[error("the tone engine has been disposed")]
    Disposed,

    #[error("audio host error: {0}")]
    Host(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::cpal::DevicesError> for AudioError {
    fn from(e: ::cpal::DevicesError) -> Self {
        AudioError::Host(e.to_string())
    }
}

impl From<::cpal::DeviceNameError> for AudioError {
    fn from(e: ::cpal::DeviceNameError) -> Self {
        AudioError::Host(e.to_string())
    }
}

impl From<::cpal::DefaultStreamConfigError> for AudioError {
    fn from(e: ::cpal::DefaultStreamConfigError) -> Self {
        AudioError::Unavailable(e.to_string())
    }
}

impl From<::cpal::BuildStreamError> for AudioError {
    fn from(e: ::cpal::BuildStreamError) -> Self {
        AudioError::Unavailable(e.to_string())
    }
}

impl From<::cpal::PlayStreamError> for AudioError {
    fn from(e: ::cpal::PlayStreamError) -> Self {
        AudioError::Unavailable(e.to_string())
    }
}
