//! Speech synthesis boundary.
//!
//! The backend itself is external; this module only defines the call shape
//! and a command-line adapter for `edge-tts`.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::voice::Voice;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

/// Turns narration text into an audio file on disk.
pub trait Synthesizer {
    fn synthesize(&self, text: &str, voice: Voice, output: &Path) -> Result<()>;
}

/// Runs the `edge-tts` command line tool once per clip.
pub struct EdgeTts {
    program: String,
}

impl EdgeTts {
    pub fn new(program: impl Into<String>) -> Self {
        EdgeTts {
            program: program.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        EdgeTts::new(config.tts_bin.clone())
    }
}

impl Synthesizer for EdgeTts {
    fn synthesize(&self, text: &str, voice: Voice, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .args(build_edge_tts_args(text, voice, output))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| Error::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(Error::Synthesis(format!(
                "{} exited with status {}: {}",
                self.program,
                result.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        match fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(Error::Synthesis(format!(
                "{} produced an empty file",
                output.display()
            ))),
            Err(e) => Err(Error::Synthesis(format!(
                "{} was not written: {e}",
                output.display()
            ))),
        }
    }
}

/// Argument list for `edge-tts`.
pub fn build_edge_tts_args(text: &str, voice: Voice, output: &Path) -> Vec<String> {
    vec![
        "--voice".to_string(),
        voice.backend_id().to_string(),
        "--text".to_string(),
        text.to_string(),
        "--write-media".to_string(),
        output.to_string_lossy().to_string(),
    ]
}
