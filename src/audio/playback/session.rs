use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::decoding::DecodedTrack;
use crate::audio::effects::EffectChain;
use crate::audio::errors::PlaybackError;
use crate::audio::types::DeckId;

use super::clock::EngineClock;
use super::sink::{OutputSink, RenderHandle, RenderRequest};

/// Where a play run started, in track time and in engine-clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackAnchor {
    pub offset_seconds: f64,
    pub start_clock_time: f64,
}

impl PlaybackAnchor {
    /// `offset + (now - start)`, clamped to `[0, duration]`.
    pub fn position_at(&self, clock_now: f64, duration_seconds: f64) -> f64 {
        let elapsed = clock_now - self.start_clock_time;
        (self.offset_seconds + elapsed).clamp(0.0, duration_seconds.max(0.0))
    }
}

/// One live render of a track, from `start` to `stop` or natural end.
///
/// Dropping a session stops it.
pub struct PlaybackSession {
    id: u64,
    deck_id: DeckId,
    track: Arc<DecodedTrack>,
    anchor: PlaybackAnchor,
    handle: Option<Box<dyn RenderHandle>>,
    stopped: Arc<AtomicBool>,
}

impl PlaybackSession {
    /// Acquires a render handle and begins playing `track` from `offset_seconds`.
    ///
    /// `on_ended` receives the session id and never fires once `stop` has begun.
    pub fn start<F>(
        id: u64,
        deck_id: DeckId,
        track: Arc<DecodedTrack>,
        offset_seconds: f64,
        chain: &EffectChain,
        sink: &dyn OutputSink,
        clock: &dyn EngineClock,
        on_ended: F,
    ) -> Result<Self, PlaybackError>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let stopped = Arc::new(AtomicBool::new(false));
        let guard = stopped.clone();
        let handle = sink.start(RenderRequest {
            deck_id,
            track: track.clone(),
            offset_seconds,
            chain,
            on_ended: Box::new(move || {
                if !guard.load(Ordering::Acquire) {
                    on_ended(id);
                }
            }),
        })?;
        let anchor = PlaybackAnchor {
            offset_seconds,
            start_clock_time: clock.now(),
        };
        log::debug!(
            "Deck {}: Session {} started at {:.3}s",
            deck_id,
            id,
            offset_seconds
        );
        Ok(PlaybackSession {
            id,
            deck_id,
            track,
            anchor,
            handle: Some(handle),
            stopped,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn position_at(&self, clock_now: f64) -> f64 {
        self.anchor
            .position_at(clock_now, self.track.duration_seconds())
    }

    pub fn is_stopped(&self) -> bool {
        self.handle.is_none()
    }

    /// Releases the render handle. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        match handle.stop() {
            Ok(()) => {
                log::debug!("Deck {}: Session {} stopped", self.deck_id, self.id);
            }
            Err(PlaybackError::HandleAlreadyStopped) => {
                log::trace!(
                    "Deck {}: Session {} had already stopped",
                    self.deck_id,
                    self.id
                );
            }
            Err(e) => {
                log::warn!(
                    "Deck {}: Session {} failed to stop cleanly: {}",
                    self.deck_id,
                    self.id,
                    e
                );
            }
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop();
    }
}
