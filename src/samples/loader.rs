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

//! Decoding sample files into mono buffers at the output rate.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

/// Frames handed to the resampler per call.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Errors raised while loading sample files.
#[derive(Debug, thiserror::Error)]
pub enum SampleLoadError {
    #[error("unable to open {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("unable to decode {path}: {source}")]
    Decode {
        path: String,
        source: SymphoniaError,
    },

    #[error("no audio track found in {0}")]
    NoTrack(String),

    #[error("sample rate not specified in {0}")]
    NoSampleRate(String),

    #[error("{0} contains no audio")]
    Empty(String),

    #[error("unable to resample from {from}Hz to {to}Hz: {reason}")]
    Resample { from: u32, to: u32, reason: String },

    #[error("no file found for sample {0}")]
    Missing(String),
}

/// Decodes the file at the given path, mixes it down to mono and resamples it
/// to the target rate.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<Vec<f32>, SampleLoadError> {
    let path_str = path.display().to_string();
    let decode_err = |source| SampleLoadError::Decode {
        path: path_str.clone(),
        source,
    };

    let file = File::open(path).map_err(|source| SampleLoadError::Io {
        path: path_str.clone(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_err)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SampleLoadError::NoTrack(path_str.clone()))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SampleLoadError::NoSampleRate(path_str.clone()))?;
    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;

    let mut mono = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(decode_err(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skipped, as players do.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = path_str.as_str(), err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(decode_err(e)),
        };

        let spec = *decoded.spec();
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        mix_to_mono(buf.samples(), spec.channels.count().max(1), &mut mono);
    }

    if mono.is_empty() {
        return Err(SampleLoadError::Empty(path_str));
    }

    let resampled = if source_rate != target_rate {
        resample(&mono, source_rate, target_rate)?
    } else {
        mono
    };

    debug!(
        path = path_str.as_str(),
        source_rate,
        target_rate,
        duration_ms = Duration::from_secs_f64(resampled.len() as f64 / target_rate as f64)
            .as_millis(),
        "Sample decoded"
    );
    Ok(resampled)
}

/// Averages interleaved frames into mono, appending to the output.
fn mix_to_mono(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
    if channels == 1 {
        output.extend_from_slice(interleaved);
        return;
    }
    output.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Resamples mono audio with a sinc resampler, trimming the resampler delay so
/// the output lines up with the input.
fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, SampleLoadError> {
    let resample_err = |e: &dyn std::fmt::Display| SampleLoadError::Resample {
        from: source_rate,
        to: target_rate,
        reason: e.to_string(),
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, INPUT_BLOCK_SIZE, 1)
        .map_err(|e| resample_err(&e))?;

    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut scratch = resampler.output_buffer_allocate(true);
    let mut output = Vec::with_capacity(expected + delay + scratch[0].len());

    let mut position = 0;
    while samples.len() - position >= resampler.input_frames_next() {
        let frames = resampler.input_frames_next();
        let (_, produced) = resampler
            .process_into_buffer(&[&samples[position..position + frames]], &mut scratch, None)
            .map_err(|e| resample_err(&e))?;
        output.extend_from_slice(&scratch[0][..produced]);
        position += frames;
    }

    if position < samples.len() {
        let (_, produced) = resampler
            .process_partial_into_buffer(Some(&[&samples[position..]][..]), &mut scratch, None)
            .map_err(|e| resample_err(&e))?;
        output.extend_from_slice(&scratch[0][..produced]);
    }

    // Flush the tail held back by the filter.
    while output.len() < expected + delay {
        let (_, produced) = resampler
            .process_partial_into_buffer(None::<&[&[f32]]>, &mut scratch, None)
            .map_err(|e| resample_err(&e))?;
        if produced == 0 {
            break;
        }
        output.extend_from_slice(&scratch[0][..produced]);
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testutil::write_wav;

    #[test]
    fn test_resample() {
        // One second of a 441Hz sine.
        let source: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 441.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let result = resample(&source, 44100, 48000).unwrap();
        assert_eq!(48000, result.len());

        // The level survives and the delay is trimmed, so the middle of the
        // output still tracks the source phase.
        let peak = result[1000..47000]
            .iter()
            .fold(0.0_f32, |peak, s| peak.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.02, "peak {}", peak);
        let at = 24000;
        let expected = (2.0 * std::f32::consts::PI * 441.0 * at as f32 / 48000.0).sin() * 0.5;
        assert!((result[at] - expected).abs() < 0.05);
    }

    #[test]
    fn test_mix_to_mono() {
        let mut mono = Vec::new();
        mix_to_mono(&[1.0, -1.0, 0.5, 0.5], 2, &mut mono);
        assert_eq!(vec![0.0, 0.5], mono);
    }

    #[test]
    fn test_load_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, 22050, &[16384, 16384, -16384, -16384, 8192, 0]);

        let mono = load_mono(&path, 22050).unwrap();
        assert_eq!(3, mono.len());
        assert!((mono[0] - 0.5).abs() < 1e-3);
        assert!((mono[1] + 0.5).abs() < 1e-3);
        assert!((mono[2] - 0.125).abs() < 1e-3);

        let upsampled = load_mono(&path, 44100).unwrap();
        assert_eq!(6, upsampled.len());
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_mono(&dir.path().join("missing.wav"), 44100),
            Err(SampleLoadError::Io { .. })
        ));

        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"this is not audio").unwrap();
        assert!(load_mono(&garbage, 44100).is_err());
    }
}
