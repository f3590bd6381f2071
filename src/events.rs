use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::FailureKind;

/// Events emitted by the dispatcher, for UI streaming and tracing sinks.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Started {
        call_id: String,
        tool: String,
        attempt: u32,
        at: DateTime<Utc>,
    },
    Finished {
        call_id: String,
        tool: String,
        /// `None` on success.
        failure: Option<FailureKind>,
        latency: Duration,
        at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    pub fn call_id(&self) -> &str {
        match self {
            DispatchEvent::Started { call_id, .. } | DispatchEvent::Finished { call_id, .. } => {
                call_id
            }
        }
    }
}
