// Library exports for the binary and for testing
pub mod channel;
pub mod chat_source;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod ingestion;
pub mod operator;
pub mod orchestrator;
pub mod shutdown;
pub mod speech;
#[cfg(unix)]
pub mod ssip;
pub mod utterance;
