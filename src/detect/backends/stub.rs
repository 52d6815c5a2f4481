use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for testing. Replays a queued script of detection lists, one per
/// frame, and reports nothing once the script runs out.
#[derive(Default)]
pub struct ScriptedBackend {
    script: VecDeque<Vec<Detection>>,
    frames_seen: u64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            frames_seen: 0,
        }
    }

    /// Queue the result for a future frame.
    pub fn push(&mut self, detections: Vec<Detection>) {
        self.script.push_back(detections);
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.frames_seen += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
