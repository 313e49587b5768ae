use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig, SupportedStreamConfigRange};

use crate::audio::decoding::DecodedTrack;
use crate::audio::effects::ChainProcessor;
use crate::audio::errors::PlaybackError;

use super::sink::{OutputSink, RenderHandle, RenderRequest};

/// Output sink on the system default device. Every `start` opens a fresh
/// stream that lives until its handle is stopped.
pub struct CpalSink {
    host: cpal::Host,
}

impl CpalSink {
    pub fn new() -> Self {
        CpalSink {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputSink for CpalSink {
    fn start(&self, request: RenderRequest<'_>) -> Result<Box<dyn RenderHandle>, PlaybackError> {
        let RenderRequest {
            deck_id,
            track,
            offset_seconds,
            chain,
            on_ended,
        } = request;

        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| PlaybackError::OutputInitError("No default output device".to_string()))?;
        let stream_config = choose_stream_config(&device, track.sample_rate())?;
        let out_channels = stream_config.channels as usize;
        let out_rate = stream_config.sample_rate.0;
        if out_rate != track.sample_rate() {
            log::debug!(
                "Deck {}: Resampling {} Hz track to {} Hz output",
                deck_id,
                track.sample_rate(),
                out_rate
            );
        }

        let mut processor = chain.processor(out_rate, stream_config.channels);
        let mut head = ReadHead::new(track, offset_seconds, out_rate);
        let finished = Arc::new(AtomicBool::new(false));
        let finished_cb = finished.clone();
        let mut on_ended = Some(on_ended);

        let data_callback = move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
            processor.refresh();
            let exhausted = head.render(output, out_channels, &mut processor);
            if exhausted && !finished_cb.swap(true, Ordering::AcqRel) {
                if let Some(callback) = on_ended.take() {
                    callback();
                }
            }
        };
        let error_callback = move |err: cpal::StreamError| {
            log::error!("CPAL stream error for deck '{}': {}", deck_id, err);
        };

        let stream = device.build_output_stream(&stream_config, data_callback, error_callback, None)?;
        stream.play()?;
        log::debug!(
            "Deck {}: CPAL stream started, {} channels at {} Hz",
            deck_id,
            out_channels,
            out_rate
        );
        Ok(Box::new(CpalRenderHandle {
            stream: Some(stream),
            finished,
        }))
    }
}

struct CpalRenderHandle {
    stream: Option<cpal::Stream>,
    finished: Arc<AtomicBool>,
}

impl RenderHandle for CpalRenderHandle {
    fn stop(&mut self) -> Result<(), PlaybackError> {
        let Some(stream) = self.stream.take() else {
            return Err(PlaybackError::HandleAlreadyStopped);
        };
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(PlaybackError::HandleAlreadyStopped);
        }
        stream.pause()?;
        Ok(())
    }
}

/// Picks an F32 config, preferring the track's own rate and stereo output.
fn choose_stream_config(
    device: &cpal::Device,
    track_sample_rate: u32,
) -> Result<StreamConfig, PlaybackError> {
    let supported: Vec<SupportedStreamConfigRange> = match device.supported_output_configs() {
        Ok(configs) => configs
            .filter(|c| c.sample_format() == SampleFormat::F32)
            .collect(),
        Err(e) => {
            log::warn!("Could not query output configs, using default: {}", e);
            Vec::new()
        }
    };

    let covers = |c: &SupportedStreamConfigRange, rate: u32| {
        c.min_sample_rate().0 <= rate && c.max_sample_rate().0 >= rate
    };

    for rate in [track_sample_rate, 48_000, 44_100] {
        let mut candidates: Vec<&SupportedStreamConfigRange> =
            supported.iter().filter(|c| covers(c, rate)).collect();
        candidates.sort_by_key(|c| c.channels() != 2);
        if let Some(config) = candidates.first() {
            return Ok(StreamConfig {
                channels: config.channels(),
                sample_rate: cpal::SampleRate(rate),
                buffer_size: cpal::BufferSize::Default,
            });
        }
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| PlaybackError::OutputInitError(e.to_string()))?;
    if fallback.sample_format() != SampleFormat::F32 {
        return Err(PlaybackError::OutputInitError(format!(
            "No F32 output configuration, device default is {:?}",
            fallback.sample_format()
        )));
    }
    log::warn!("Using default output config as fallback: {:?}", fallback);
    Ok(fallback.config())
}

/// Forward-only read position into a track, resampled by linear interpolation.
pub(crate) struct ReadHead {
    track: Arc<DecodedTrack>,
    position: f64,
    step: f64,
}

impl ReadHead {
    pub(crate) fn new(track: Arc<DecodedTrack>, offset_seconds: f64, output_rate: u32) -> Self {
        let position = track.frame_at(offset_seconds) as f64;
        let step = track.sample_rate() as f64 / output_rate.max(1) as f64;
        ReadHead {
            track,
            position,
            step,
        }
    }

    /// Fills `output` with interleaved frames. Returns `true` once the track is exhausted.
    pub(crate) fn render(
        &mut self,
        output: &mut [f32],
        out_channels: usize,
        processor: &mut ChainProcessor,
    ) -> bool {
        let frames = self.track.frame_count();
        let track_channels = self.track.channels() as usize;
        let samples = self.track.samples();

        for frame_out in output.chunks_mut(out_channels.max(1)) {
            let idx = self.position.floor() as usize;
            if idx >= frames {
                frame_out.fill(0.0);
                continue;
            }
            let next = (idx + 1).min(frames - 1);
            let fraction = self.position.fract() as f32;
            for (ch, sample_out) in frame_out.iter_mut().enumerate() {
                let src = ch % track_channels;
                let s1 = samples[idx * track_channels + src];
                let s2 = samples[next * track_channels + src];
                *sample_out = processor.process(ch, s1 + (s2 - s1) * fraction);
            }
            self.position += self.step;
        }
        self.position.floor() as usize >= frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::effects::EffectChain;

    fn ramp(frames: usize, rate: u32) -> Arc<DecodedTrack> {
        let samples = (0..frames).map(|i| i as f32 / frames as f32).collect();
        Arc::new(DecodedTrack::from_interleaved(samples, rate, 1).unwrap())
    }

    #[test]
    fn mono_track_fills_every_output_channel() {
        let chain = EffectChain::new();
        let mut processor = chain.processor(1000, 2);
        let mut head = ReadHead::new(ramp(100, 1000), 0.05, 1000);
        let mut out = vec![0.0f32; 8];
        assert!(!head.render(&mut out, 2, &mut processor));
        assert!((out[0] - 0.5).abs() < 1e-3);
        assert!((out[0] - out[1]).abs() < 1e-6);
        assert!((out[2] - 0.51).abs() < 1e-3);
    }

    #[test]
    fn exhaustion_pads_with_silence() {
        let chain = EffectChain::new();
        let mut processor = chain.processor(1000, 1);
        let mut head = ReadHead::new(ramp(10, 1000), 0.0, 1000);
        let mut out = vec![1.0f32; 16];
        assert!(head.render(&mut out, 1, &mut processor));
        assert!(out[10..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn offset_past_the_end_is_exhausted_immediately() {
        let chain = EffectChain::new();
        let mut processor = chain.processor(1000, 1);
        let mut head = ReadHead::new(ramp(10, 1000), 5.0, 1000);
        let mut out = vec![1.0f32; 4];
        assert!(head.render(&mut out, 1, &mut processor));
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn upsampling_interpolates_between_frames() {
        let chain = EffectChain::new();
        let mut processor = chain.processor(2000, 1);
        let mut head = ReadHead::new(ramp(100, 1000), 0.0, 2000);
        let mut out = vec![0.0f32; 4];
        head.render(&mut out, 1, &mut processor);
        assert!((out[1] - 0.005).abs() < 1e-3);
        assert!((out[2] - 0.01).abs() < 1e-3);
    }

    #[test]
    fn gain_is_applied_after_the_eq() {
        let mut chain = EffectChain::new();
        chain.set_volume(0.5);
        chain.set_master_gain(0.5);
        let mut processor = chain.processor(1000, 1);
        let mut head = ReadHead::new(ramp(100, 1000), 0.05, 1000);
        let mut out = vec![0.0f32; 1];
        head.render(&mut out, 1, &mut processor);
        assert!((out[0] - 0.125).abs() < 1e-3);
    }
}
