use std::path::PathBuf;

use thiserror::Error;

use crate::model::VoiceId;

/// Conditions that stop the pipeline.
///
/// Everything else is reported as [`crate::Feedback`] and the pipeline
/// carries on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open ABC source {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create MIDI file {path}: {source}")]
    FileCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write MIDI file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("feature refers to voice {0}, which is not defined in the tune")]
    UnknownVoice(VoiceId),
}

pub type Result<T> = std::result::Result<T, Error>;
