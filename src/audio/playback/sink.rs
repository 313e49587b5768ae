use std::sync::Arc;

use crate::audio::decoding::DecodedTrack;
use crate::audio::effects::EffectChain;
use crate::audio::errors::PlaybackError;
use crate::audio::types::DeckId;

/// Invoked at most once, from the render thread, when the track runs out.
pub type CompletionCallback = Box<dyn FnOnce() + Send + 'static>;

/// Everything a sink needs to render one uninterrupted play run.
pub struct RenderRequest<'a> {
    pub deck_id: DeckId,
    pub track: Arc<DecodedTrack>,
    pub offset_seconds: f64,
    pub chain: &'a EffectChain,
    pub on_ended: CompletionCallback,
}

/// The host's one-shot playback primitive.
///
/// A started handle plays forward from its offset until it is stopped or the
/// track is exhausted. It cannot be repositioned or restarted.
pub trait OutputSink {
    fn start(&self, request: RenderRequest<'_>) -> Result<Box<dyn RenderHandle>, PlaybackError>;
}

pub trait RenderHandle {
    /// Stops rendering and releases the output. A second call, or a call after
    /// the track ran out, returns `PlaybackError::HandleAlreadyStopped`.
    fn stop(&mut self) -> Result<(), PlaybackError>;
}
