pub mod audio;

pub use audio::config::EngineConfig;
pub use audio::decoding::{DecodedTrack, decode_bytes};
pub use audio::effects::EffectChain;
pub use audio::errors::{DeckError, EngineError};
pub use audio::playback::commands::EngineHandle;
pub use audio::playback::deck::{DeckContext, DeckController};
pub use audio::playback::events::MixerEvent;
pub use audio::playback::mixer::CrossfadeMixer;
pub use audio::playback::session::PlaybackSession;
pub use audio::playback::spawn_engine_thread;
pub use audio::playback::time::format_time;
pub use audio::types::{DeckId, DeckSnapshot, DeckState, EqBand, EqParams, MixerSnapshot, SeekTarget};

/// Installs the `env_logger` backend, `info` unless `RUST_LOG` says otherwise.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
