use serde::{Deserialize, Serialize};

/// One narrated unit of a video: its own audio clip and target duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    pub title: String,
    pub narration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    /// Seconds as written in the storyboard header, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_duration: Option<f64>,
    /// Seconds probed from the rendered audio file. Authoritative once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_duration: Option<f64>,
}

impl Scene {
    /// Deterministic audio file name: `audio_{NNN}_{title}.{ext}`.
    pub fn audio_file_name(&self, extension: &str) -> String {
        format!(
            "audio_{:03}_{}.{}",
            self.scene_number,
            safe_file_stem(&self.title),
            extension.trim_start_matches('.')
        )
    }

    /// Measured duration if present, otherwise the declared one.
    pub fn effective_duration(&self) -> Option<f64> {
        self.measured_duration.or(self.declared_duration)
    }

    pub fn with_measured_duration(mut self, secs: Option<f64>) -> Self {
        self.measured_duration = secs;
        self
    }
}

/// Replace characters that are not allowed in file names on common
/// filesystems. An empty title becomes `scene`.
pub fn safe_file_stem(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "scene".to_string()
    } else {
        cleaned
    }
}

/// Round to two decimals, the precision durations are recorded with.
pub fn round_secs(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
