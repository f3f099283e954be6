use std::sync::Mutex;

use anyhow::{anyhow, Result};
use symtrack_schema::{Assessment, Episode, StatusEvent, StatusUpdate};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Transport-specific send primitive for status events.
///
/// `send` must not block; a failed delivery is the caller's to log and
/// swallow, never to propagate.
pub trait StatusTransport: Send + Sync {
    fn send(&self, event: &StatusEvent) -> Result<()>;
}

/// Forwards events into an outbound mpsc channel. Uses `try_send`: a full
/// or disconnected channel drops the event rather than blocking the tool.
pub struct ChannelTransport {
    tx: mpsc::Sender<StatusEvent>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self { tx }
    }
}

impl StatusTransport for ChannelTransport {
    fn send(&self, event: &StatusEvent) -> Result<()> {
        self.tx
            .try_send(event.clone())
            .map_err(|e| anyhow!("status channel unavailable: {e}"))
    }
}

/// Transport that discards everything; events are still accumulated for
/// persistence on the connection itself.
pub struct NullTransport;

impl StatusTransport for NullTransport {
    fn send(&self, _event: &StatusEvent) -> Result<()> {
        Ok(())
    }
}

/// Per-turn client notification endpoint.
///
/// Every send constructs the tagged event, appends it to an internal
/// ordered list (persisted with the assistant message afterwards), and
/// dispatches through the transport fire-and-forget.
pub struct ClientConnection {
    transport: Box<dyn StatusTransport>,
    sent: Mutex<Vec<StatusEvent>>,
}

impl ClientConnection {
    pub fn new(transport: Box<dyn StatusTransport>) -> Self {
        Self {
            transport,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Connection with no live transport; useful when no client is
    /// subscribed and in tests.
    pub fn detached() -> Self {
        Self::new(Box::new(NullTransport))
    }

    pub fn send_symptom_added(&self, episode: &Episode) {
        self.dispatch(StatusUpdate::SymptomAdded {
            episode_id: episode.id,
            symptom_name: episode.symptom_name.clone(),
            location: episode.location.clone(),
        });
    }

    pub fn send_symptom_updated(&self, episode: &Episode) {
        self.dispatch(StatusUpdate::SymptomUpdated {
            episode_id: episode.id,
            symptom_name: episode.symptom_name.clone(),
        });
    }

    pub fn send_symptom_resolved(&self, episode: &Episode) {
        self.dispatch(StatusUpdate::SymptomResolved {
            episode_id: episode.id,
            symptom_name: episode.symptom_name.clone(),
        });
    }

    pub fn send_assessment_generating(&self, message: impl Into<String>) {
        self.dispatch(StatusUpdate::AssessmentGenerating {
            message: message.into(),
        });
    }

    pub fn send_assessment_analyzing(&self, message: impl Into<String>) {
        self.dispatch(StatusUpdate::AssessmentAnalyzing {
            message: message.into(),
        });
    }

    pub fn send_assessment_created(&self, assessment: &Assessment) {
        self.dispatch(StatusUpdate::AssessmentCreated {
            assessment_id: assessment.id,
            hypothesis: assessment.hypothesis.clone(),
            confidence: assessment.confidence,
        });
    }

    pub fn send_assessment_complete(&self, assessment_id: Uuid, message: impl Into<String>) {
        self.dispatch(StatusUpdate::AssessmentComplete {
            assessment_id,
            message: message.into(),
        });
    }

    pub fn send_processing(&self, message: impl Into<String>) {
        self.dispatch(StatusUpdate::Processing {
            message: message.into(),
        });
    }

    pub fn send_completed(&self, message: impl Into<String>) {
        self.dispatch(StatusUpdate::Completed {
            message: message.into(),
        });
    }

    /// Ordered list of every event emitted during this turn.
    pub fn events(&self) -> Vec<StatusEvent> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn dispatch(&self, update: StatusUpdate) {
        let event = StatusEvent::now(update);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(event.clone());
        }
        if let Err(e) = self.transport.send(&event) {
            tracing::warn!("status event delivery failed ({}): {e}", event.kind());
        }
    }
}
