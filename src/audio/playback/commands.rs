use tokio::sync::{mpsc, oneshot, watch};

use crate::audio::errors::EngineError;
use crate::audio::types::{DeckId, EqBand, MixerSnapshot, SeekTarget};

// --- Engine Thread Commands ---
#[derive(Debug)]
pub enum MixerCommand {
    Load { deck_id: DeckId, source: String },
    Play(DeckId),
    Pause(DeckId),
    TogglePlay(DeckId),
    Seek { deck_id: DeckId, target: SeekTarget },
    SetVolume { deck_id: DeckId, volume: f32 },
    Mute(DeckId),
    Unmute(DeckId),
    SetEq { deck_id: DeckId, band: EqBand, gain_db: f32 },
    SetCrossfade(f32),
    Reset,
    Shutdown(oneshot::Sender<()>),
}

// --- Host Handle ---

/// Cloneable front door to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<MixerCommand>,
    snapshots: watch::Receiver<MixerSnapshot>,
}

impl EngineHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<MixerCommand>,
        snapshots: watch::Receiver<MixerSnapshot>,
    ) -> Self {
        EngineHandle { sender, snapshots }
    }

    async fn send(&self, command: MixerCommand) -> Result<(), EngineError> {
        self.sender.send(command).await.map_err(|e| {
            log::error!("Failed to send {:?} to engine thread", e.0);
            EngineError::from(e)
        })
    }

    pub async fn load(&self, deck_id: DeckId, source: impl Into<String>) -> Result<(), EngineError> {
        let source = source.into();
        log::info!("CMD: Load '{}' on deck {}", source, deck_id);
        self.send(MixerCommand::Load { deck_id, source }).await
    }

    pub async fn play(&self, deck_id: DeckId) -> Result<(), EngineError> {
        log::info!("CMD: Play deck {}", deck_id);
        self.send(MixerCommand::Play(deck_id)).await
    }

    pub async fn pause(&self, deck_id: DeckId) -> Result<(), EngineError> {
        log::info!("CMD: Pause deck {}", deck_id);
        self.send(MixerCommand::Pause(deck_id)).await
    }

    pub async fn toggle_play(&self, deck_id: DeckId) -> Result<(), EngineError> {
        log::info!("CMD: Toggle play on deck {}", deck_id);
        self.send(MixerCommand::TogglePlay(deck_id)).await
    }

    pub async fn seek(&self, deck_id: DeckId, target: SeekTarget) -> Result<(), EngineError> {
        log::info!("CMD: Seek deck {} to {:?}", deck_id, target);
        self.send(MixerCommand::Seek { deck_id, target }).await
    }

    pub async fn set_volume(&self, deck_id: DeckId, volume: f32) -> Result<(), EngineError> {
        log::debug!("CMD: Set volume for deck {}: {}", deck_id, volume);
        self.send(MixerCommand::SetVolume { deck_id, volume }).await
    }

    pub async fn mute(&self, deck_id: DeckId) -> Result<(), EngineError> {
        log::info!("CMD: Mute deck {}", deck_id);
        self.send(MixerCommand::Mute(deck_id)).await
    }

    pub async fn unmute(&self, deck_id: DeckId) -> Result<(), EngineError> {
        log::info!("CMD: Unmute deck {}", deck_id);
        self.send(MixerCommand::Unmute(deck_id)).await
    }

    pub async fn set_eq(&self, deck_id: DeckId, band: EqBand, gain_db: f32) -> Result<(), EngineError> {
        log::debug!("CMD: Set {} EQ for deck {} to {} dB", band.as_str(), deck_id, gain_db);
        self.send(MixerCommand::SetEq {
            deck_id,
            band,
            gain_db,
        })
        .await
    }

    pub async fn set_crossfade(&self, position: f32) -> Result<(), EngineError> {
        log::debug!("CMD: Set crossfade to {}", position);
        self.send(MixerCommand::SetCrossfade(position)).await
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        log::info!("CMD: Reset mixer");
        self.send(MixerCommand::Reset).await
    }

    /// Latest sampled state of both decks.
    pub fn snapshot(&self) -> MixerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every new snapshot.
    pub fn subscribe(&self) -> watch::Receiver<MixerSnapshot> {
        self.snapshots.clone()
    }

    /// Stops both decks and waits for the engine loop to confirm it has exited.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        log::info!("CMD: Shutdown engine");
        let (tx, rx) = oneshot::channel();
        self.send(MixerCommand::Shutdown(tx)).await?;
        rx.await?;
        log::info!("Engine shutdown confirmed");
        Ok(())
    }
}
