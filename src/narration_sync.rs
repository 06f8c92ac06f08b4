//! Render-side narration synchronization.
//!
//! An animation script calls [`NarrationSync::begin`] when a scene starts and
//! [`NarrationSync::await_narration`] once its animations are done. The
//! returned [`NarrationWait`] says how long to hold the frame so the scene
//! ends with its narration.

use crate::error::{Error, Result};
use crate::timeline::Timeline;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Source of the renderer's current time, in seconds.
pub trait RenderClock {
    fn now(&self) -> f64;
}

/// Wall clock measured from construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl RenderClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Scene name to narration length, with a fallback for unknown scenes.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneTimings {
    durations: HashMap<String, f64>,
    default_secs: f64,
}

impl SceneTimings {
    pub fn new(default_secs: f64) -> Self {
        SceneTimings {
            durations: HashMap::new(),
            default_secs,
        }
    }

    /// Map timeline entries to caller scene names by position: the entry
    /// with `index` i belongs to `names[i - 1]`. Entries without a name and
    /// names without an entry are ignored.
    pub fn from_timeline(timeline: &Timeline, names: &[&str], default_secs: f64) -> Self {
        let mut timings = SceneTimings::new(default_secs);
        for entry in &timeline.scenes {
            let Some(name) = entry.index.checked_sub(1).and_then(|i| names.get(i)) else {
                debug!(index = entry.index, "timeline entry has no scene name");
                continue;
            };
            timings.insert(name, entry.duration);
        }
        timings
    }

    /// Like [`SceneTimings::from_timeline`], reading the timeline from disk.
    /// A missing or unreadable file yields an empty lookup.
    pub fn load_or_default(path: &Path, names: &[&str], default_secs: f64) -> Self {
        match Timeline::load(path) {
            Ok(timeline) => SceneTimings::from_timeline(&timeline, names, default_secs),
            Err(e) => {
                warn!("{e}; every scene will use {default_secs}s");
                SceneTimings::new(default_secs)
            }
        }
    }

    pub fn insert(&mut self, name: &str, secs: f64) {
        self.durations.insert(name.to_string(), secs);
    }

    pub fn get(&self, name: &str) -> f64 {
        self.durations.get(name).copied().unwrap_or(self.default_secs)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.durations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveScene {
    pub name: String,
    pub started_at: f64,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Idle,
    Active(ActiveScene),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NarrationWait {
    /// Hold for this many seconds.
    Pause(f64),
    /// Animations already ran past the narration; no pause.
    Overrun { overrun_by: f64 },
}

impl NarrationWait {
    pub fn pause_secs(&self) -> f64 {
        match self {
            NarrationWait::Pause(secs) => *secs,
            NarrationWait::Overrun { .. } => 0.0,
        }
    }
}

pub struct NarrationSync<C: RenderClock> {
    timings: SceneTimings,
    clock: C,
    state: SyncState,
}

impl<C: RenderClock> NarrationSync<C> {
    pub fn new(timings: SceneTimings, clock: C) -> Self {
        NarrationSync {
            timings,
            clock,
            state: SyncState::Idle,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn timings(&self) -> &SceneTimings {
        &self.timings
    }

    /// Start a scene and return its target duration. Starting a scene while
    /// another is active replaces it.
    pub fn begin(&mut self, name: &str) -> f64 {
        if let SyncState::Active(previous) = &self.state {
            warn!(
                previous = %previous.name,
                next = %name,
                "scene started before the previous one was awaited"
            );
        }
        if !self.timings.contains(name) {
            debug!(scene = %name, "no timing, using default");
        }
        let target = self.timings.get(name);
        self.state = SyncState::Active(ActiveScene {
            name: name.to_string(),
            started_at: self.clock.now(),
            target,
        });
        target
    }

    /// Finish the active scene given how many seconds its animations used.
    pub fn await_narration(&mut self, consumed: f64) -> Result<NarrationWait> {
        let SyncState::Active(scene) = std::mem::replace(&mut self.state, SyncState::Idle) else {
            return Err(Error::NarrationNotStarted);
        };
        let remaining = scene.target - consumed;
        if remaining > 0.0 {
            debug!(scene = %scene.name, "holding {remaining:.2}s for narration");
            Ok(NarrationWait::Pause(remaining))
        } else {
            let overrun_by = -remaining;
            warn!(
                scene = %scene.name,
                "animations ran {overrun_by:.2}s past the {:.2}s narration",
                scene.target
            );
            Ok(NarrationWait::Overrun { overrun_by })
        }
    }

    /// Like [`NarrationSync::await_narration`], measuring consumed time on
    /// the render clock since `begin`.
    pub fn await_narration_by_clock(&mut self) -> Result<NarrationWait> {
        let consumed = match &self.state {
            SyncState::Active(scene) => self.clock.now() - scene.started_at,
            SyncState::Idle => return Err(Error::NarrationNotStarted),
        };
        self.await_narration(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineEntry;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct ManualClock(Rc<Cell<f64>>);

    impl ManualClock {
        fn advance(&self, secs: f64) {
            self.0.set(self.0.get() + secs);
        }
    }

    impl RenderClock for ManualClock {
        fn now(&self) -> f64 {
            self.0.get()
        }
    }

    fn timeline(durations: &[f64]) -> Timeline {
        Timeline {
            total_duration: durations.iter().sum(),
            scenes: durations
                .iter()
                .enumerate()
                .map(|(i, d)| TimelineEntry {
                    index: i + 1,
                    scene_num: i as u32 + 1,
                    title: format!("s{}", i + 1),
                    duration: *d,
                    audio_file: format!("audio_{:03}.mp3", i + 1),
                    voiceover: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn maps_timeline_positions_to_names() {
        let timings =
            SceneTimings::from_timeline(&timeline(&[10.0, 6.5, 3.0]), &["Intro", "Body"], 5.0);
        assert_eq!(timings.get("Intro"), 10.0);
        assert_eq!(timings.get("Body"), 6.5);
        assert_eq!(timings.get("Outro"), 5.0);
        assert_eq!(timings.len(), 2);
    }

    #[test]
    fn unmeasured_scene_does_not_shift_later_names() {
        use crate::config::SyncConfig;
        use crate::scene::Scene;
        use crate::timeline::build_timeline;

        let scene = |n: u32, secs: Option<f64>| Scene {
            scene_number: n,
            title: format!("s{n}"),
            narration: "读白".to_string(),
            emotion: None,
            declared_duration: None,
            measured_duration: secs,
        };
        let scenes = vec![scene(1, Some(10.0)), scene(2, None), scene(3, Some(30.0))];
        let build = build_timeline(&scenes, "xiaoxiao", &SyncConfig::default());

        let timings =
            SceneTimings::from_timeline(&build.timeline, &["opening", "middle", "ending"], 5.0);
        assert_eq!(timings.get("opening"), 10.0);
        assert_eq!(timings.get("middle"), 5.0);
        assert_eq!(timings.get("ending"), 30.0);
    }

    #[test]
    fn pause_fills_remaining_narration() {
        let timings = SceneTimings::from_timeline(&timeline(&[10.0]), &["Intro"], 5.0);
        let mut sync = NarrationSync::new(timings, ManualClock::default());
        assert_eq!(sync.begin("Intro"), 10.0);
        assert_eq!(sync.await_narration(6.0).unwrap(), NarrationWait::Pause(4.0));
        assert_eq!(sync.state(), &SyncState::Idle);
    }

    #[test]
    fn overrun_is_reported_without_pause() {
        let timings = SceneTimings::from_timeline(&timeline(&[10.0]), &["Intro"], 5.0);
        let mut sync = NarrationSync::new(timings, ManualClock::default());
        sync.begin("Intro");
        let wait = sync.await_narration(11.0).unwrap();
        assert_eq!(wait, NarrationWait::Overrun { overrun_by: 1.0 });
        assert_eq!(wait.pause_secs(), 0.0);
    }

    #[test]
    fn unknown_scene_uses_default() {
        let mut sync = NarrationSync::new(SceneTimings::new(5.0), ManualClock::default());
        assert_eq!(sync.begin("Anything"), 5.0);
        assert_eq!(sync.await_narration(2.0).unwrap(), NarrationWait::Pause(3.0));
    }

    #[test]
    fn await_without_begin_is_an_error() {
        let mut sync = NarrationSync::new(SceneTimings::new(5.0), ManualClock::default());
        assert!(matches!(sync.await_narration(1.0), Err(Error::NarrationNotStarted)));
        sync.begin("A");
        sync.await_narration(1.0).unwrap();
        assert!(matches!(sync.await_narration(1.0), Err(Error::NarrationNotStarted)));
        assert!(matches!(sync.await_narration_by_clock(), Err(Error::NarrationNotStarted)));
    }

    #[test]
    fn begin_while_active_restarts() {
        let mut timings = SceneTimings::new(5.0);
        timings.insert("B", 8.0);
        let mut sync = NarrationSync::new(timings, ManualClock::default());
        sync.begin("A");
        sync.begin("B");
        match sync.state() {
            SyncState::Active(scene) => assert_eq!(scene.name, "B"),
            SyncState::Idle => panic!("expected an active scene"),
        }
        assert_eq!(sync.await_narration(2.0).unwrap(), NarrationWait::Pause(6.0));
    }

    #[test]
    fn clock_driven_await_measures_elapsed() {
        let clock = ManualClock::default();
        let mut timings = SceneTimings::new(5.0);
        timings.insert("Intro", 10.0);
        let mut sync = NarrationSync::new(timings, clock.clone());
        clock.advance(100.0);
        sync.begin("Intro");
        clock.advance(7.5);
        assert_eq!(sync.await_narration_by_clock().unwrap(), NarrationWait::Pause(2.5));
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock::new();
        let first = clock.now();
        assert!(first >= 0.0);
        assert!(clock.now() >= first);
    }

    #[test]
    fn missing_timeline_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.json");
        let timings = SceneTimings::load_or_default(&path, &["A"], 5.0);
        assert!(timings.is_empty());
        assert_eq!(timings.get("A"), 5.0);
    }
}
