use crate::audio::types::DeckId;

use super::deck::{DeckContext, DeckController};
use super::events::MixerEvent;

pub const CROSSFADE_CENTER: f32 = 0.5;

/// Linear crossfade law: `(gain_a, gain_b)` for a fader position in `[0, 1]`.
pub fn crossfade_gains(position: f32) -> (f32, f32) {
    (1.0 - position, position)
}

/// Two decks and the crossfader between them.
pub struct CrossfadeMixer {
    deck_a: DeckController,
    deck_b: DeckController,
    position: f32,
}

impl CrossfadeMixer {
    pub fn new(ctx: DeckContext) -> Self {
        let mut mixer = CrossfadeMixer {
            deck_a: DeckController::new(DeckId::A, ctx.clone()),
            deck_b: DeckController::new(DeckId::B, ctx),
            position: CROSSFADE_CENTER,
        };
        mixer.apply_gains();
        mixer
    }

    pub fn deck(&self, id: DeckId) -> &DeckController {
        match id {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    pub fn deck_mut(&mut self, id: DeckId) -> &mut DeckController {
        match id {
            DeckId::A => &mut self.deck_a,
            DeckId::B => &mut self.deck_b,
        }
    }

    pub fn crossfade(&self) -> f32 {
        self.position
    }

    /// Moves the crossfader. Input is clamped to `[0, 1]`; NaN is ignored.
    pub fn set_crossfade(&mut self, position: f32) {
        if position.is_nan() {
            log::warn!("Crossfade ignored, position is not a number");
            return;
        }
        self.position = position.clamp(0.0, 1.0);
        self.apply_gains();
        log::debug!("Crossfade set to {:.3}", self.position);
    }

    /// Applies pending completions on both decks.
    pub fn poll(&mut self) -> Vec<MixerEvent> {
        let mut events = self.deck_a.poll();
        events.extend(self.deck_b.poll());
        events
    }

    /// Resets both decks and re-centres the crossfader.
    pub fn reset(&mut self) {
        self.deck_a.reset();
        self.deck_b.reset();
        self.position = CROSSFADE_CENTER;
        self.apply_gains();
    }

    fn apply_gains(&mut self) {
        let (gain_a, gain_b) = crossfade_gains(self.position);
        self.deck_a.set_master_gain(gain_a);
        self.deck_b.set_master_gain(gain_b);
    }
}
