//! # Run Events
//!
//! What the coordinator streams to its observer: one [`StageStatus`] per
//! stage transition or progress notice, then exactly one terminal event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::context::RunResult;
use super::pipeline::StageState;

/// Snapshot of one stage, as sent on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageStatus {
    /// 1-based ordinal
    pub step: usize,
    pub name: String,
    #[serde(rename = "status")]
    pub state: StageState,
    pub current_action: String,
    /// 0 until complete, then 100
    pub progress: u8,
    /// Whole seconds since the run started
    pub time_elapsed: u64,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageStatus {
    pub fn pending(step: usize, name: &str) -> Self {
        Self {
            step,
            name: name.to_string(),
            state: StageState::Pending,
            current_action: String::new(),
            progress: 0,
            time_elapsed: 0,
            elapsed_ms: 0,
            output: None,
            error: None,
        }
    }

    /// Record elapsed run time; never moves backwards.
    pub(crate) fn stamp(&mut self, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        self.elapsed_ms = self.elapsed_ms.max(ms);
        self.time_elapsed = self.elapsed_ms / 1000;
    }
}

/// An event streamed during a run
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Status(StageStatus),
    Complete(Box<RunResult>),
    Error(Box<RunResult>),
}

impl PipelineEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Status(_) => "status",
            PipelineEvent::Complete(_) => "complete",
            PipelineEvent::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Status(_))
    }

    /// JSON body of the event
    pub fn payload(&self) -> serde_json::Result<String> {
        match self {
            PipelineEvent::Status(status) => serde_json::to_string(status),
            PipelineEvent::Complete(result) | PipelineEvent::Error(result) => {
                serde_json::to_string(result)
            }
        }
    }
}

/// Monotonic run clock, captured once at run start
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl RunClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wall-clock start, for reporting only
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_shape() {
        let mut status = StageStatus::pending(3, "Paper Selector");
        status.state = StageState::Running;
        status.current_action = "Reading".to_string();
        status.stamp(Duration::from_millis(2500));

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["step"], 3);
        assert_eq!(value["status"], "running");
        assert_eq!(value["currentAction"], "Reading");
        assert_eq!(value["timeElapsed"], 2);
        assert!(value.get("output").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_stamp_never_decreases() {
        let mut status = StageStatus::pending(1, "CV Parser");
        status.stamp(Duration::from_secs(5));
        status.stamp(Duration::from_secs(3));
        assert_eq!(status.time_elapsed, 5);
    }
}
