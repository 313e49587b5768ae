use std::io::Cursor;
use std::sync::Arc;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use super::config::DEFAULT_SAMPLE_CAPACITY;
use super::errors::AudioDecodingError;

/// Immutable decoded PCM audio, produced once per successful load.
#[derive(Debug)]
pub struct DecodedTrack {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
    duration_seconds: f64,
}

impl DecodedTrack {
    /// Builds a track from interleaved samples. Returns `None` for a zero rate or channel count.
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Option<Self> {
        if sample_rate == 0 || channels == 0 {
            return None;
        }
        let frames = samples.len() / channels as usize;
        Some(DecodedTrack {
            samples: samples.into(),
            sample_rate,
            channels,
            duration_seconds: frames as f64 / sample_rate as f64,
        })
    }

    /// Interleaved PCM.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// First frame to render for a start offset in seconds.
    pub fn frame_at(&self, seconds: f64) -> usize {
        let frame = (seconds.max(0.0) * self.sample_rate as f64).round() as usize;
        frame.min(self.frame_count())
    }
}

/// Decodes an in-memory compressed payload to interleaved f32 samples.
pub fn decode_bytes(source_id: &str, bytes: Vec<u8>) -> Result<DecodedTrack, AudioDecodingError> {
    if bytes.is_empty() {
        return Err(AudioDecodingError::EmptyPayload {
            source_id: source_id.to_string(),
        });
    }
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let hint = Hint::new();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioDecodingError::FormatError {
            source_id: source_id.to_string(),
            source: e,
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| AudioDecodingError::NoSuitableTrack {
            source_id: source_id.to_string(),
        })?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioDecodingError::MissingSampleRate {
            source_id: source_id.to_string(),
        })?;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioDecodingError::DecoderCreationError {
            source_id: source_id.to_string(),
            source: e,
        })?;

    let mut samples: Vec<f32> = Vec::with_capacity(DEFAULT_SAMPLE_CAPACITY);
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        match format.next_packet() {
            Ok(packet) => {
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(audio_buf) => {
                        // Some containers only report the layout once frames arrive.
                        if channels.is_none() {
                            channels = Some(audio_buf.spec().channels.count() as u16);
                        }
                        let needed = audio_buf.capacity() * audio_buf.spec().channels.count();
                        if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
                            sample_buf = Some(SampleBuffer::<f32>::new(
                                audio_buf.capacity() as u64,
                                *audio_buf.spec(),
                            ));
                        }
                        if let Some(buf) = sample_buf.as_mut() {
                            buf.copy_interleaved_ref(audio_buf);
                            samples.extend_from_slice(buf.samples());
                        }
                    }
                    Err(SymphoniaError::DecodeError(err_desc)) => {
                        log::warn!("Decode: Ignoring decode error in '{}': {}", source_id, err_desc);
                    }
                    Err(e) => {
                        return Err(AudioDecodingError::FatalDecodeError {
                            source_id: source_id.to_string(),
                            source: e,
                        });
                    }
                }
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                log::debug!("Decode: Reached EOF for '{}'", source_id);
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                log::warn!("Decode: Decoder reset required unexpectedly for '{}'", source_id);
                break;
            }
            Err(e) => {
                return Err(AudioDecodingError::PacketReadIoError {
                    source_id: source_id.to_string(),
                    source: e,
                });
            }
        }
    }

    decoder.finalize();
    let channels = channels.unwrap_or(1);
    log::debug!(
        "Decode: Decoded {} samples ({} ch) at {} Hz for '{}'",
        samples.len(),
        channels,
        sample_rate,
        source_id
    );
    if samples.is_empty() {
        return Err(AudioDecodingError::NoSamplesDecoded {
            source_id: source_id.to_string(),
        });
    }

    DecodedTrack::from_interleaved(samples, sample_rate, channels).ok_or_else(|| {
        AudioDecodingError::NoSamplesDecoded {
            source_id: source_id.to_string(),
        }
    })
}
