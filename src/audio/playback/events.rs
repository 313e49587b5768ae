use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio::decoding::DecodedTrack;
use crate::audio::errors::DeckError;
use crate::audio::types::DeckId;

/// Completions delivered back to the owning deck on its control thread.
#[derive(Debug)]
pub(crate) enum DeckEvent {
    LoadFinished {
        generation: u64,
        result: Result<DecodedTrack, DeckError>,
    },
    SessionEnded {
        session_id: u64,
    },
}

/// Discrete notifications for the host. Position is never pushed; hosts sample it.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MixerEvent {
    LoadCompleted { deck_id: DeckId, duration: f64 },
    LoadFailed { deck_id: DeckId, reason: String },
    TrackEnded { deck_id: DeckId },
}

// --- Event Emitter Helpers ---

pub(crate) fn emit_mixer_events(sender: &mpsc::UnboundedSender<MixerEvent>, events: Vec<MixerEvent>) {
    for event in events {
        log::debug!("Emitting {:?}", event);
        if let Err(e) = sender.send(event) {
            log::warn!("Failed to emit mixer event, receiver dropped: {:?}", e.0);
        }
    }
}
