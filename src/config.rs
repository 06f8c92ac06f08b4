use crate::error::{Error, Result};
use crate::voice::Voice;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

pub const CONFIG_FILE: &str = "storyboard_sync.json";

/// Every tunable default of the pipeline. Passed by reference into each
/// entry point so several documents or voices can be processed side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Voice used for synthesis and recorded in the manifest.
    pub voice: Voice,
    /// Extension of synthesized audio files (without the dot).
    pub audio_extension: String,
    pub manifest_file: String,
    pub timeline_file: String,
    /// Maximum characters of narration kept in a timeline preview.
    pub preview_chars: usize,
    /// Clips shorter than this are reported as warnings.
    pub short_audio_secs: f64,
    /// Duration assumed by the renderer for scenes missing from the timeline.
    pub default_scene_secs: f64,
    /// Speaker recorded for results-table rows without a speaker cell.
    pub default_speaker: String,
    /// Emotion recorded for results-table rows without an emotion cell.
    pub default_emotion: String,
    /// Bold label introducing a narration block (`**读白**`).
    pub narration_label: String,
    /// Bold label introducing an emotion tag (`**情感**`).
    pub emotion_label: String,
    /// Heading text that opens the results table section.
    pub results_section: String,
    pub ffprobe_bin: String,
    pub tts_bin: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            voice: Voice::default(),
            audio_extension: "mp3".to_string(),
            manifest_file: "audio_info.json".to_string(),
            timeline_file: "timeline.json".to_string(),
            preview_chars: 100,
            short_audio_secs: 1.0,
            default_scene_secs: 5.0,
            default_speaker: Voice::default().short_name().to_string(),
            default_emotion: "平和".to_string(),
            narration_label: "读白".to_string(),
            emotion_label: "情感".to_string(),
            results_section: "音频生成清单".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            tts_bin: "edge-tts".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from `path`, or from `storyboard_sync.json` in the
    /// working directory. Missing or corrupt files yield the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new(CONFIG_FILE));
        if !path.exists() {
            return SyncConfig::default();
        }
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(config) => return config,
                Err(e) => warn!(path = %path.display(), "corrupt config file, using defaults: {e}"),
            },
            Err(e) => warn!(path = %path.display(), "could not read config file: {e}"),
        }
        SyncConfig::default()
    }

    /// Persist the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| Error::json(path, e))?;
        fs::write(path, json).map_err(|e| Error::io(path, e))
    }
}
