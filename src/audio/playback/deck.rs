use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::audio::decoding::{self, DecodedTrack};
use crate::audio::effects::EffectChain;
use crate::audio::errors::{AudioDecodingError, DeckError};
use crate::audio::retrieval::AudioRetriever;
use crate::audio::types::{DeckId, DeckState, EqBand, SeekTarget};

use super::clock::EngineClock;
use super::events::{DeckEvent, MixerEvent};
use super::session::PlaybackSession;
use super::sink::OutputSink;

/// Collaborators a deck needs from its host.
#[derive(Clone)]
pub struct DeckContext {
    pub clock: Arc<dyn EngineClock>,
    pub sink: Arc<dyn OutputSink>,
    pub retriever: Arc<dyn AudioRetriever>,
    /// Runtime that runs retrieval and decoding off the control thread.
    pub runtime: Handle,
}

/// One deck: makes a one-shot, forward-only render primitive look like a
/// seekable, pausable player.
///
/// Not thread-safe. All calls must come from a single control context.
pub struct DeckController {
    id: DeckId,
    state: DeckState,
    track: Option<Arc<DecodedTrack>>,
    offset_seconds: f64,
    session: Option<PlaybackSession>,
    chain: EffectChain,
    error: Option<DeckError>,
    load_generation: u64,
    next_session_id: u64,
    ctx: DeckContext,
    events_tx: mpsc::UnboundedSender<DeckEvent>,
    events_rx: mpsc::UnboundedReceiver<DeckEvent>,
}

impl DeckController {
    pub fn new(id: DeckId, ctx: DeckContext) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        DeckController {
            id,
            state: DeckState::Empty,
            track: None,
            offset_seconds: 0.0,
            session: None,
            chain: EffectChain::new(),
            error: None,
            load_generation: 0,
            next_session_id: 0,
            ctx,
            events_tx,
            events_rx,
        }
    }

    pub fn id(&self) -> DeckId {
        self.id
    }

    pub fn state(&self) -> DeckState {
        self.state
    }

    pub fn error(&self) -> Option<&DeckError> {
        self.error.as_ref()
    }

    pub fn track(&self) -> Option<&Arc<DecodedTrack>> {
        self.track.as_ref()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.track.as_ref().map_or(0.0, |t| t.duration_seconds())
    }

    pub fn effect_chain(&self) -> &EffectChain {
        &self.chain
    }

    /// Id of the live session, if any.
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id())
    }

    /// Current play head in seconds. Side-effect free.
    pub fn current_position(&self) -> f64 {
        match (&self.session, self.state) {
            (Some(session), DeckState::Playing) => session.position_at(self.ctx.clock.now()),
            _ => self.offset_seconds.clamp(0.0, self.duration_seconds()),
        }
    }

    // --- Transport ---

    /// Starts retrieving and decoding `source`. Returns immediately; the deck
    /// sits in `Loading` until the newest load completes.
    pub fn load(&mut self, source: &str) {
        let source = source.trim();
        if source.is_empty() {
            self.ignore("load with an empty source");
            return;
        }
        self.teardown_session();
        self.track = None;
        self.offset_seconds = 0.0;
        self.error = None;
        self.state = DeckState::Loading;
        self.load_generation += 1;

        let generation = self.load_generation;
        let retriever = self.ctx.retriever.clone();
        let events_tx = self.events_tx.clone();
        let source = source.to_string();
        log::info!("Deck {}: Loading '{}' (load #{})", self.id, source, generation);

        self.ctx.runtime.spawn(async move {
            let result = retrieve_and_decode(retriever, source).await;
            // The deck may be gone by now; nothing left to report to.
            let _ = events_tx.send(DeckEvent::LoadFinished { generation, result });
        });
    }

    pub fn play(&mut self) {
        match self.state {
            DeckState::Playing => {
                log::debug!("Deck {}: Play ignored, already playing", self.id);
            }
            DeckState::Ready | DeckState::Paused => {
                if self.offset_seconds >= self.duration_seconds() {
                    log::debug!("Deck {}: Play at end of track, rewinding", self.id);
                    self.offset_seconds = 0.0;
                }
                self.start_session(self.offset_seconds);
            }
            DeckState::Empty | DeckState::Loading | DeckState::Errored => {
                self.ignore("play without a loaded track");
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != DeckState::Playing {
            self.ignore("pause while not playing");
            return;
        }
        let position = self.current_position();
        self.teardown_session();
        self.offset_seconds = position;
        self.state = DeckState::Paused;
        log::info!("Deck {}: Paused at {:.3}s", self.id, position);
    }

    pub fn toggle_play(&mut self) {
        if self.state == DeckState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn seek(&mut self, target: SeekTarget) {
        if !self.state.has_track() {
            self.ignore("seek without a loaded track");
            return;
        }
        let Some(position) = target.resolve(self.duration_seconds()) else {
            log::warn!("Deck {}: Seek ignored, target {:?} is not a number", self.id, target);
            return;
        };
        let was_playing = self.state == DeckState::Playing;
        self.teardown_session();
        self.offset_seconds = position;
        log::info!("Deck {}: Seek to {:.3}s", self.id, position);
        if was_playing {
            self.start_session(position);
            if self.state != DeckState::Playing {
                self.state = DeckState::Paused;
            }
        }
    }

    /// Tears everything down and returns to `Empty` with a default effect chain.
    pub fn reset(&mut self) {
        self.teardown_session();
        self.track = None;
        self.offset_seconds = 0.0;
        self.error = None;
        self.state = DeckState::Empty;
        // Any load still in flight is now stale.
        self.load_generation += 1;
        self.chain.reset();
        log::info!("Deck {}: Reset", self.id);
    }

    // --- Effect chain ---

    pub fn set_volume(&mut self, volume: f32) {
        self.chain.set_volume(volume);
    }

    pub fn mute(&mut self) {
        self.chain.mute();
    }

    pub fn unmute(&mut self) {
        self.chain.unmute();
    }

    pub fn set_eq(&mut self, band: EqBand, gain_db: f32) {
        self.chain.set_eq(band, gain_db);
    }

    pub(crate) fn set_master_gain(&mut self, gain: f32) {
        self.chain.set_master_gain(gain);
    }

    // --- Completions ---

    /// Applies every completion that has arrived. Never blocks.
    pub fn poll(&mut self) -> Vec<MixerEvent> {
        let mut emitted = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            emitted.extend(self.apply_event(event));
        }
        emitted
    }

    /// Waits for the next completion and applies it. `None` when it was stale.
    pub async fn settle(&mut self) -> Option<MixerEvent> {
        let event = self.events_rx.recv().await?;
        self.apply_event(event)
    }

    fn apply_event(&mut self, event: DeckEvent) -> Option<MixerEvent> {
        match event {
            DeckEvent::LoadFinished { generation, result } => {
                if generation != self.load_generation || self.state != DeckState::Loading {
                    log::debug!(
                        "Deck {}: Discarding stale load #{} (current #{})",
                        self.id,
                        generation,
                        self.load_generation
                    );
                    return None;
                }
                match result {
                    Ok(track) => {
                        let duration = track.duration_seconds();
                        self.track = Some(Arc::new(track));
                        self.offset_seconds = 0.0;
                        self.state = DeckState::Ready;
                        log::info!("Deck {}: Ready, duration {:.3}s", self.id, duration);
                        Some(MixerEvent::LoadCompleted {
                            deck_id: self.id,
                            duration,
                        })
                    }
                    Err(e) => {
                        log::error!("Deck {}: Load failed: {}", self.id, e);
                        let reason = e.to_string();
                        self.error = Some(e);
                        self.state = DeckState::Errored;
                        Some(MixerEvent::LoadFailed {
                            deck_id: self.id,
                            reason,
                        })
                    }
                }
            }
            DeckEvent::SessionEnded { session_id } => {
                if self.state != DeckState::Playing || self.session_id() != Some(session_id) {
                    log::debug!("Deck {}: Discarding stale end of session {}", self.id, session_id);
                    return None;
                }
                self.teardown_session();
                self.offset_seconds = self.duration_seconds();
                self.state = DeckState::Paused;
                log::info!("Deck {}: Reached end of track", self.id);
                Some(MixerEvent::TrackEnded { deck_id: self.id })
            }
        }
    }

    // --- Session lifecycle ---

    fn start_session(&mut self, offset_seconds: f64) {
        let Some(track) = self.track.clone() else {
            self.ignore("start without a track");
            return;
        };
        // Never two renders at once.
        self.teardown_session();

        self.next_session_id += 1;
        let events_tx = self.events_tx.clone();
        match PlaybackSession::start(
            self.next_session_id,
            self.id,
            track,
            offset_seconds,
            &self.chain,
            self.ctx.sink.as_ref(),
            self.ctx.clock.as_ref(),
            move |session_id| {
                let _ = events_tx.send(DeckEvent::SessionEnded { session_id });
            },
        ) {
            Ok(session) => {
                self.session = Some(session);
                self.offset_seconds = offset_seconds;
                self.state = DeckState::Playing;
                log::info!("Deck {}: Playing from {:.3}s", self.id, offset_seconds);
            }
            Err(e) => {
                log::error!("Deck {}: Failed to start playback: {}", self.id, e);
            }
        }
    }

    fn teardown_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }

    fn ignore(&self, what: &'static str) {
        log::debug!(
            "Deck {}: {} (state {:?})",
            self.id,
            DeckError::InvalidOperation(what),
            self.state
        );
    }
}

async fn retrieve_and_decode(
    retriever: Arc<dyn AudioRetriever>,
    source: String,
) -> Result<DecodedTrack, DeckError> {
    let bytes = retriever.fetch(&source).await?;
    let source_id = source.clone();
    tokio::task::spawn_blocking(move || decoding::decode_bytes(&source_id, bytes))
        .await
        .map_err(|e| AudioDecodingError::DecodeTaskPanic {
            source_id: source,
            reason: e.to_string(),
        })?
        .map_err(DeckError::from)
}
