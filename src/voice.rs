use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The narration voices the synthesis backend offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// Female, warm. The default narrator.
    #[default]
    Xiaoxiao,
    /// Female, bright.
    Xiaoyi,
    /// Male, steady.
    Yunjian,
    /// Male, gentle.
    Yunxi,
    /// Male, energetic.
    Yunxia,
    /// Male, professional.
    Yunyang,
}

impl Voice {
    pub const ALL: [Voice; 6] = [
        Voice::Xiaoxiao,
        Voice::Xiaoyi,
        Voice::Yunjian,
        Voice::Yunxi,
        Voice::Yunxia,
        Voice::Yunyang,
    ];

    /// Short name used in storyboards, configs and the CLI.
    pub fn short_name(&self) -> &'static str {
        match self {
            Voice::Xiaoxiao => "xiaoxiao",
            Voice::Xiaoyi => "xiaoyi",
            Voice::Yunjian => "yunjian",
            Voice::Yunxi => "yunxi",
            Voice::Yunxia => "yunxia",
            Voice::Yunyang => "yunyang",
        }
    }

    /// Backend voice id passed to the synthesizer.
    pub fn backend_id(&self) -> &'static str {
        match self {
            Voice::Xiaoxiao => "zh-CN-XiaoxiaoNeural",
            Voice::Xiaoyi => "zh-CN-XiaoyiNeural",
            Voice::Yunjian => "zh-CN-YunjianNeural",
            Voice::Yunxi => "zh-CN-YunxiNeural",
            Voice::Yunxia => "zh-CN-YunxiaNeural",
            Voice::Yunyang => "zh-CN-YunyangNeural",
        }
    }

    /// Parse either the short name or the backend id (case-insensitive).
    pub fn from_str_loose(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Voice::ALL
            .into_iter()
            .find(|v| v.short_name() == wanted || v.backend_id().to_lowercase() == wanted)
            .ok_or_else(|| Error::InvalidVoice(s.to_string()))
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
