//! Run events
//!
//! Every event is logged through `tracing` with an `event` field
//! (`step-start`, `info`, `warn`, `error`) and optionally forwarded to a
//! channel so a front-end can render progress.

use crate::provider::ExternalId;
use crate::state::RunOutcome;
use provflow_core::ResourceKind;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    StepStarted {
        id: String,
        kind: ResourceKind,
    },
    Adopted {
        id: String,
        external_id: ExternalId,
    },
    Created {
        id: String,
        external_id: ExternalId,
        attempts: u32,
    },
    Retrying {
        id: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Ready {
        id: String,
        external_id: ExternalId,
    },
    Failed {
        id: String,
        error: String,
    },
    Halted {
        reason: String,
    },
    RollbackStarted {
        count: usize,
    },
    RolledBack {
        id: String,
        external_id: ExternalId,
    },
    Retained {
        id: String,
        external_id: ExternalId,
    },
    Leaked {
        id: String,
        external_id: ExternalId,
        error: String,
    },
    Finished {
        outcome: RunOutcome,
    },
}

/// Severity used for the structured `event` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    StepStart,
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::StepStart => "step-start",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        }
    }
}

impl RunEvent {
    pub fn level(&self) -> EventLevel {
        match self {
            RunEvent::StepStarted { .. } => EventLevel::StepStart,
            RunEvent::Adopted { .. }
            | RunEvent::Created { .. }
            | RunEvent::Ready { .. }
            | RunEvent::RolledBack { .. }
            | RunEvent::Retained { .. } => EventLevel::Info,
            RunEvent::Retrying { .. } | RunEvent::Halted { .. } | RunEvent::RollbackStarted { .. } => {
                EventLevel::Warn
            }
            RunEvent::Failed { .. } | RunEvent::Leaked { .. } => EventLevel::Error,
            RunEvent::Finished { outcome } => {
                if outcome.is_success() {
                    EventLevel::Info
                } else {
                    EventLevel::Error
                }
            }
        }
    }

    /// Resource id the event refers to, if any
    pub fn resource(&self) -> Option<&str> {
        match self {
            RunEvent::StepStarted { id, .. }
            | RunEvent::Adopted { id, .. }
            | RunEvent::Created { id, .. }
            | RunEvent::Retrying { id, .. }
            | RunEvent::Ready { id, .. }
            | RunEvent::Failed { id, .. }
            | RunEvent::RolledBack { id, .. }
            | RunEvent::Retained { id, .. }
            | RunEvent::Leaked { id, .. } => Some(id),
            RunEvent::Halted { .. } | RunEvent::RollbackStarted { .. } | RunEvent::Finished { .. } => {
                None
            }
        }
    }
}

/// Logs events and forwards them to an optional listener
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sink that only logs
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: RunEvent) {
        let level = event.level().as_str();
        let resource = event.resource().unwrap_or("-");
        match event.level() {
            EventLevel::StepStart | EventLevel::Info => {
                tracing::info!(event = level, resource, detail = ?event, "run event");
            }
            EventLevel::Warn => {
                tracing::warn!(event = level, resource, detail = ?event, "run event");
            }
            EventLevel::Error => {
                tracing::error!(event = level, resource, detail = ?event, "run event");
            }
        }

        if let Some(sender) = &self.sender {
            // Listener may have gone away; the run carries on regardless
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        let started = RunEvent::StepStarted {
            id: "network".into(),
            kind: ResourceKind::Network,
        };
        assert_eq!(started.level().as_str(), "step-start");
        assert_eq!(started.resource(), Some("network"));

        let leaked = RunEvent::Leaked {
            id: "rule".into(),
            external_id: "sg-1".into(),
            error: "denied".into(),
        };
        assert_eq!(leaked.level(), EventLevel::Error);
    }

    #[tokio::test]
    async fn test_sink_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        sink.emit(RunEvent::Halted {
            reason: "boom".into(),
        });
        assert_eq!(
            rx.recv().await,
            Some(RunEvent::Halted {
                reason: "boom".into()
            })
        );
    }
}
