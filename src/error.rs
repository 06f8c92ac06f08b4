use std::path::PathBuf;
use thiserror::Error;

/// Fatal, document-level failures. Per-scene problems are reported as data
/// (`ParseIssue`, `Finding`, `SceneFailure`) and never surface here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("input document not found: {}", .0.display())]
    DocumentMissing(PathBuf),

    #[error("audio directory not found: {}", .0.display())]
    AudioDirMissing(PathBuf),

    #[error("no scenes with narration found in storyboard")]
    NoScenes,

    #[error("no rows found in the '{0}' table")]
    NoTableRows(String),

    #[error(
        "results table row for scene {scene} follows scene {previous}; \
         rows must be unique and ascending"
    )]
    TableOrder { previous: u32, scene: u32 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("batch list: {0}")]
    BatchList(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("await_narration called with no active scene")]
    NarrationNotStarted,

    #[error(
        "unknown voice '{0}'. Expected one of: \
         xiaoxiao, xiaoyi, yunjian, yunxi, yunxia, yunyang"
    )]
    InvalidVoice(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}
