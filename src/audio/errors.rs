use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

/// Failure reasons a deck surfaces to its caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeckError {
    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),
    #[error("Decode failed: {0}")]
    DecodeFailed(String),
    /// Operation ignored because the deck state cannot honor it. Logged, never returned.
    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Empty source identifier")]
    EmptySource,
    #[error("Invalid retrieval endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("Server error: {status} - {reason}")]
    ServerStatus { status: u16, reason: String },
    #[error("Payload exceeds limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum AudioEffectsError {
    #[error("Failed to calculate {filter_type} coefficients")]
    CoefficientCalculationError { filter_type: String },
}

#[derive(Error, Debug)]
pub enum AudioDecodingError {
    #[error("Empty payload for '{source_id}'")]
    EmptyPayload { source_id: String },
    #[error("Symphonia format error for '{source_id}': {source}")]
    FormatError {
        source_id: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("No suitable audio track in '{source_id}'")]
    NoSuitableTrack { source_id: String },
    #[error("Sample rate missing in '{source_id}'")]
    MissingSampleRate { source_id: String },
    #[error("Failed to create decoder for '{source_id}': {source}")]
    DecoderCreationError {
        source_id: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("Symphonia fatal decode error in '{source_id}': {source}")]
    FatalDecodeError {
        source_id: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("Symphonia I/O error reading packet for '{source_id}': {source}")]
    PacketReadIoError {
        source_id: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("No samples decoded from '{source_id}'")]
    NoSamplesDecoded { source_id: String },
    #[error("Decode task failed for '{source_id}': {reason}")]
    DecodeTaskPanic { source_id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to initialize audio output: {0}")]
    OutputInitError(String),
    #[error("Failed to build output stream: {0}")]
    StreamBuildError(#[from] cpal::BuildStreamError),
    #[error("Failed to start output stream: {0}")]
    StreamPlayError(#[from] cpal::PlayStreamError),
    #[error("Failed to pause output stream: {0}")]
    StreamPauseError(#[from] cpal::PauseStreamError),
    /// Returned by a render handle that was already stopped or ran out of samples.
    #[error("Render handle already stopped")]
    HandleAlreadyStopped,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine command channel closed")]
    ChannelClosed,
    #[error("Failed to receive shutdown confirmation: {0}")]
    ShutdownSignalError(#[from] tokio::sync::oneshot::error::RecvError),
    #[error("Failed to spawn engine thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
    #[error("Failed to set up retrieval: {0}")]
    Retrieval(#[from] RetrievalError),
}

impl From<RetrievalError> for DeckError {
    fn from(err: RetrievalError) -> DeckError {
        DeckError::RetrievalFailed(err.to_string())
    }
}

impl From<AudioDecodingError> for DeckError {
    fn from(err: AudioDecodingError) -> DeckError {
        DeckError::DecodeFailed(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for EngineError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> EngineError {
        EngineError::ChannelClosed
    }
}
