use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::audio::config::{COMMAND_CHANNEL_SIZE, EngineConfig};
use crate::audio::errors::EngineError;
use crate::audio::retrieval::{AudioRetriever, HttpRetriever};
use crate::audio::types::MixerSnapshot;

pub mod clock;
pub mod commands;
pub mod cpal_sink;
pub mod deck;
pub mod events;
pub mod mixer;
pub mod session;
pub mod sink;
pub mod state;
pub mod time;

#[cfg(test)]
pub(crate) mod test_support;

use clock::MonotonicClock;
use commands::{EngineHandle, MixerCommand};
use cpal_sink::CpalSink;
use deck::DeckContext;
use events::{MixerEvent, emit_mixer_events};
use mixer::CrossfadeMixer;

// --- Engine Thread Implementation ---

/// Spawns the engine thread and returns a handle to it plus the stream of
/// discrete mixer events.
///
/// The audio output is created on the engine thread, since streams cannot
/// cross threads.
pub fn spawn_engine_thread(
    config: EngineConfig,
) -> Result<(EngineHandle, mpsc::UnboundedReceiver<MixerEvent>), EngineError> {
    let retriever: Arc<dyn AudioRetriever> = Arc::new(HttpRetriever::new(&config)?);
    let (command_tx, command_rx) = mpsc::channel::<MixerCommand>(COMMAND_CHANNEL_SIZE);
    let (snapshot_tx, snapshot_rx) = watch::channel(MixerSnapshot::idle());
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let interval = Duration::from_millis(config.sampler_interval_ms);

    std::thread::Builder::new()
        .name("deck-engine".to_string())
        .spawn(move || {
            log::info!("Engine Thread: Building Tokio current_thread runtime...");
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Engine Thread: Failed to build Tokio runtime: {}", e);
                    return;
                }
            };
            let mixer = CrossfadeMixer::new(DeckContext {
                clock: Arc::new(MonotonicClock::new()),
                sink: Arc::new(CpalSink::new()),
                retriever,
                runtime: rt.handle().clone(),
            });
            rt.block_on(run_mixer_loop(mixer, command_rx, interval, snapshot_tx, event_tx));
            log::info!("Engine thread has stopped.");
        })?;

    Ok((EngineHandle::new(command_tx, snapshot_rx), event_rx))
}

/// Applies host commands and samples both decks every `interval` until
/// shutdown or until every command sender is gone.
pub(crate) async fn run_mixer_loop(
    mut mixer: CrossfadeMixer,
    mut receiver: mpsc::Receiver<MixerCommand>,
    interval: Duration,
    snapshot_tx: watch::Sender<MixerSnapshot>,
    event_tx: mpsc::UnboundedSender<MixerEvent>,
) {
    log::info!("Engine thread entering main loop.");
    let mut should_shutdown = false;
    let mut sampler = tokio::time::interval(interval);
    sampler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while !should_shutdown {
        tokio::select! {
            maybe_command = receiver.recv() => {
                match maybe_command {
                    Some(MixerCommand::Shutdown(shutdown_complete_tx)) => {
                        log::info!("Engine Thread: Shutdown received. Resetting decks.");
                        mixer.reset();
                        should_shutdown = true;
                        if shutdown_complete_tx.send(()).is_err() {
                            log::error!("Engine Thread: Failed to send shutdown completion signal.");
                        }
                    }
                    Some(command) => {
                        log::debug!("Engine Thread Received: {:?}", command);
                        handle_command(&mut mixer, command);
                        snapshot_tx.send_replace(time::mixer_snapshot(&mixer));
                    }
                    None => {
                        log::info!("Engine Thread: Command channel closed. Exiting loop.");
                        mixer.reset();
                        should_shutdown = true;
                    }
                }
            }
            _ = sampler.tick(), if !should_shutdown => {
                let slice = time::process_time_slice(&mut mixer);
                snapshot_tx.send_replace(slice.snapshot);
                emit_mixer_events(&event_tx, slice.events);
            }
        }
    }
    log::info!("Engine thread loop finished.");
}

fn handle_command(mixer: &mut CrossfadeMixer, command: MixerCommand) {
    match command {
        MixerCommand::Load { deck_id, source } => mixer.deck_mut(deck_id).load(&source),
        MixerCommand::Play(deck_id) => mixer.deck_mut(deck_id).play(),
        MixerCommand::Pause(deck_id) => mixer.deck_mut(deck_id).pause(),
        MixerCommand::TogglePlay(deck_id) => mixer.deck_mut(deck_id).toggle_play(),
        MixerCommand::Seek { deck_id, target } => mixer.deck_mut(deck_id).seek(target),
        MixerCommand::SetVolume { deck_id, volume } => mixer.deck_mut(deck_id).set_volume(volume),
        MixerCommand::Mute(deck_id) => mixer.deck_mut(deck_id).mute(),
        MixerCommand::Unmute(deck_id) => mixer.deck_mut(deck_id).unmute(),
        MixerCommand::SetEq {
            deck_id,
            band,
            gain_db,
        } => mixer.deck_mut(deck_id).set_eq(band, gain_db),
        MixerCommand::SetCrossfade(position) => mixer.set_crossfade(position),
        MixerCommand::Reset => mixer.reset(),
        // Handled by the loop itself.
        MixerCommand::Shutdown(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use tokio::runtime::Handle;

    use super::*;
    use crate::audio::decoding::tests::wav_bytes;
    use crate::audio::types::{DeckId, DeckState, EqBand, SeekTarget};
    use super::test_support::{GatedRetriever, ManualClock, RecordingSink};
    use super::clock::EngineClock;

    struct Harness {
        handle: EngineHandle,
        events: mpsc::UnboundedReceiver<MixerEvent>,
        clock: ManualClock,
        sink: RecordingSink,
    }

    fn engine(
        retriever: Arc<GatedRetriever>,
    ) -> (Harness, impl std::future::Future<Output = ()>) {
        let clock = ManualClock::new();
        let sink = RecordingSink::with_clock(clock.clone());
        let mixer = CrossfadeMixer::new(DeckContext {
            clock: Arc::new(clock.clone()),
            sink: Arc::new(sink.clone()),
            retriever,
            runtime: Handle::current(),
        });
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (snapshot_tx, snapshot_rx) = watch::channel(MixerSnapshot::idle());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let run = run_mixer_loop(
            mixer,
            command_rx,
            Duration::from_millis(1),
            snapshot_tx,
            event_tx,
        );
        (
            Harness {
                handle: EngineHandle::new(command_tx, snapshot_rx),
                events: event_rx,
                clock,
                sink,
            },
            run,
        )
    }

    #[tokio::test]
    async fn commands_drive_decks_and_snapshots_follow() {
        let retriever = GatedRetriever::new();
        retriever.ready("a", Ok(wav_bytes(10, 1000, 2)));
        let (mut h, run) = engine(retriever);

        let host = async move {
            h.handle.load(DeckId::A, "a").await.unwrap();
            let event = h.events.recv().await.unwrap();
            assert_eq!(
                event,
                MixerEvent::LoadCompleted {
                    deck_id: DeckId::A,
                    duration: 10.0
                }
            );

            h.handle.play(DeckId::A).await.unwrap();
            h.handle.set_eq(DeckId::A, EqBand::Bass, -6.0).await.unwrap();
            h.handle.set_crossfade(0.0).await.unwrap();
            h.handle.seek(DeckId::A, SeekTarget::Seconds(4.0)).await.unwrap();

            let mut snapshots = h.handle.subscribe();
            snapshots
                .wait_for(|s| s.deck_a.position == 4.0 && s.crossfade == 0.0)
                .await
                .unwrap();
            h.clock.advance(1.5);
            let snapshot = snapshots
                .wait_for(|s| s.deck_a.position >= 5.5)
                .await
                .unwrap()
                .clone();
            assert_eq!(snapshot.deck_a.state, DeckState::Playing);
            assert_eq!(snapshot.deck_a.eq.bass_gain_db, -6.0);
            assert_eq!(snapshot.crossfade, 0.0);
            assert_eq!(snapshot.deck_b.state, DeckState::Empty);

            h.clock.advance(10.0);
            h.sink.fire_due(h.clock.now());
            let event = h.events.recv().await.unwrap();
            assert_eq!(event, MixerEvent::TrackEnded { deck_id: DeckId::A });

            h.handle.shutdown().await.unwrap();
            assert_eq!(h.sink.live_handles(), 0);
        };
        tokio::join!(run, host);
    }

    #[tokio::test]
    async fn toggle_play_command_flips_transport() {
        let retriever = GatedRetriever::new();
        retriever.ready("b", Ok(wav_bytes(20, 1000, 1)));
        let (mut h, run) = engine(retriever);

        let host = async move {
            h.handle.load(DeckId::B, "b").await.unwrap();
            h.events.recv().await.unwrap();
            let mut snapshots = h.handle.subscribe();

            h.handle.toggle_play(DeckId::B).await.unwrap();
            snapshots
                .wait_for(|s| s.deck_b.state == DeckState::Playing)
                .await
                .unwrap();
            h.clock.advance(3.0);

            h.handle.toggle_play(DeckId::B).await.unwrap();
            let snapshot = snapshots
                .wait_for(|s| s.deck_b.state == DeckState::Paused)
                .await
                .unwrap()
                .clone();
            assert_eq!(snapshot.deck_b.position, 3.0);
            assert_eq!(h.sink.live_handles(), 0);
            h.handle.shutdown().await.unwrap();
        };
        tokio::join!(run, host);
    }

    #[tokio::test]
    async fn failed_load_is_reported_to_the_host() {
        let (mut h, run) = engine(GatedRetriever::new());
        let host = async move {
            h.handle.load(DeckId::B, "missing").await.unwrap();
            match h.events.recv().await.unwrap() {
                MixerEvent::LoadFailed { deck_id, reason } => {
                    assert_eq!(deck_id, DeckId::B);
                    assert!(reason.contains("missing"));
                }
                other => panic!("unexpected event {:?}", other),
            }
            let snapshot = h.handle.snapshot();
            assert_eq!(snapshot.deck_b.state, DeckState::Errored);
            assert!(!snapshot.deck_b.controls_enabled);
            assert!(snapshot.deck_b.error.is_some());
            h.handle.shutdown().await.unwrap();
        };
        tokio::join!(run, host);
    }

    #[tokio::test]
    async fn loop_exits_when_every_handle_is_dropped() {
        let (h, run) = engine(GatedRetriever::new());
        drop(h);
        run.await;
    }

    #[tokio::test]
    async fn commands_after_shutdown_report_closed_channel() {
        let (h, run) = engine(GatedRetriever::new());
        let handle = h.handle.clone();
        let host = async move {
            handle.shutdown().await.unwrap();
        };
        tokio::join!(run, host);
        assert!(matches!(
            h.handle.play(DeckId::A).await,
            Err(EngineError::ChannelClosed)
        ));
    }
}
