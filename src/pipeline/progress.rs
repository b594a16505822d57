//! Live progress of a pipeline run.
//!
//! The orchestrator pushes events into a [`ProgressSink`]; the HTTP layer
//! forwards them as server-sent events and the CLI folds them into a
//! [`ProgressBoard`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Analysis,
    Insights,
    Reading,
    Generation,
    Quality,
    /// Pseudo-stage carrying a run failure.
    Error,
}

impl Stage {
    /// The real stages, without [`Stage::Error`].
    pub const PIPELINE: [Self; 5] = [
        Self::Analysis,
        Self::Insights,
        Self::Reading,
        Self::Generation,
        Self::Quality,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Insights => "insights",
            Self::Reading => "reading",
            Self::Generation => "generation",
            Self::Quality => "quality",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
}

/// One progress update. The stage goes out under the `step` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "step")]
    pub stage: Stage,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn new(stage: Stage, status: Status, message: Option<String>) -> Self {
        Self {
            stage,
            status,
            message,
        }
    }
}

/// Sending half of a progress stream.
///
/// Events are delivered in call order. Starting a later stage while an earlier
/// one is still open completes the earlier one first, so consumers never see
/// two stages running at once. A dropped receiver is not an error: the run
/// carries on without an audience.
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    open: Mutex<Option<Stage>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            tx: Some(tx),
            open: Mutex::new(None),
        }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A sink that drops every event.
    pub fn silent() -> Self {
        Self {
            tx: None,
            open: Mutex::new(None),
        }
    }

    pub fn running(&self, stage: Stage, message: impl Into<String>) {
        let previous = {
            let mut open = self.lock_open();
            let previous = open.filter(|prev| *prev < stage);
            *open = Some(stage);
            previous
        };
        if let Some(prev) = previous {
            self.emit(ProgressEvent::new(prev, Status::Complete, None));
        }
        self.emit(ProgressEvent::new(stage, Status::Running, Some(message.into())));
    }

    pub fn complete(&self, stage: Stage, message: impl Into<String>) {
        {
            let mut open = self.lock_open();
            if open.is_some_and(|s| s <= stage) {
                *open = None;
            }
        }
        self.emit(ProgressEvent::new(stage, Status::Complete, Some(message.into())));
    }

    /// Report a run failure.
    pub fn error(&self, message: impl Into<String>) {
        *self.lock_open() = None;
        self.emit(ProgressEvent::new(Stage::Error, Status::Error, Some(message.into())));
    }

    /// Stage most recently started and not yet completed.
    pub fn current_stage(&self) -> Option<Stage> {
        *self.lock_open()
    }

    fn lock_open(&self) -> std::sync::MutexGuard<'_, Option<Stage>> {
        // The guarded value is a plain `Option<Stage>`, valid even after a panic.
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            stage = %event.stage,
            status = ?event.status,
            message = event.message.as_deref().unwrap_or(""),
            "progress"
        );
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Consumer-side view of a run, folded from its events.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    statuses: BTreeMap<Stage, Status>,
    messages: BTreeMap<Stage, String>,
    failure: Option<String>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event in. A stage starting marks every earlier stage complete.
    pub fn apply(&mut self, event: &ProgressEvent) {
        if event.stage == Stage::Error {
            self.failure = Some(event.message.clone().unwrap_or_default());
            return;
        }

        if event.status == Status::Running {
            for earlier in Stage::PIPELINE.iter().filter(|s| **s < event.stage) {
                let status = self.statuses.entry(*earlier).or_default();
                if *status != Status::Error {
                    *status = Status::Complete;
                }
            }
        }

        self.statuses.insert(event.stage, event.status);
        if let Some(message) = &event.message {
            self.messages.insert(event.stage, message.clone());
        }
    }

    pub fn status(&self, stage: Stage) -> Status {
        self.statuses.get(&stage).copied().unwrap_or_default()
    }

    pub fn message(&self, stage: Stage) -> Option<&str> {
        self.messages.get(&stage).map(String::as_str)
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// One-line summary, e.g. `analysis:complete reading:running ...`.
    pub fn summary(&self) -> String {
        Stage::PIPELINE
            .iter()
            .map(|stage| {
                let status = match self.status(*stage) {
                    Status::Pending => "pending",
                    Status::Running => "running",
                    Status::Complete => "complete",
                    Status::Error => "error",
                };
                format!("{stage}:{status}")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
