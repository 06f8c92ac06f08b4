//! storyboard_sync: narration audio for scene-based explainer videos.
//!
//! A storyboard is parsed into scenes, each scene's narration is synthesized
//! and measured, and the measured durations flow into a manifest, a timeline
//! for the renderer, and back into the storyboard's results table.
//! A CSV list of `filename,text` rows can be synthesized the same way
//! without a storyboard. The CLI consumes this crate.

pub mod batch;
pub mod config;
pub mod error;
pub mod narration_sync;
pub mod pipeline;
pub mod probe;
pub mod scene;
pub mod storyboard;
pub mod synth;
pub mod timeline;
pub mod validator;
pub mod voice;

pub use error::{Error, Result};
