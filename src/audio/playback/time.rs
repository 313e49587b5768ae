use crate::audio::types::{DeckId, DeckSnapshot, MixerSnapshot};

use super::deck::DeckController;
use super::events::MixerEvent;
use super::mixer::CrossfadeMixer;

/// Formats seconds as `m:ss`. Negative and non-finite input renders as `0:00`.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub(crate) fn deck_snapshot(deck: &DeckController) -> DeckSnapshot {
    let position = deck.current_position();
    let duration = deck.duration_seconds();
    let progress = if duration > 0.0 { position / duration } else { 0.0 };
    let chain = deck.effect_chain();
    DeckSnapshot {
        deck_id: deck.id(),
        state: deck.state(),
        position,
        duration,
        progress,
        volume: if chain.is_muted() { chain.last_volume() } else { chain.volume() },
        muted: chain.is_muted(),
        eq: chain.eq_params(),
        controls_enabled: deck.state().has_track(),
        error: deck.error().map(|e| e.to_string()),
    }
}

pub fn mixer_snapshot(mixer: &CrossfadeMixer) -> MixerSnapshot {
    MixerSnapshot {
        deck_a: deck_snapshot(mixer.deck(DeckId::A)),
        deck_b: deck_snapshot(mixer.deck(DeckId::B)),
        crossfade: mixer.crossfade(),
    }
}

pub(crate) struct TimeSlice {
    pub snapshot: MixerSnapshot,
    pub events: Vec<MixerEvent>,
}

/// One sampler tick: apply completions, then sample both decks.
pub(crate) fn process_time_slice(mixer: &mut CrossfadeMixer) -> TimeSlice {
    let events = mixer.poll();
    for event in &events {
        if let MixerEvent::TrackEnded { deck_id } = event {
            log::debug!("Deck {}: End of track picked up by sampler", deck_id);
        }
    }
    TimeSlice {
        snapshot: mixer_snapshot(mixer),
        events,
    }
}
