pub mod config;
pub mod decoding;
pub mod effects;
pub mod errors;
pub mod playback;
pub mod retrieval;
pub mod types;
