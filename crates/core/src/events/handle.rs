use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::ImportEvent;

/// Envelope wrapping an event with the time it was emitted
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: ImportEvent,
}

/// Handle for emitting events
///
/// Cheaply cloneable. Events go through a channel to the [`EventWriter`].
/// Emitting never fails the caller; lost events are logged.
///
/// [`EventWriter`]: super::EventWriter
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventHandle {
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: ImportEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit import event: {}", e);
        }
    }

    /// Emit without waiting. Returns false if the event was dropped.
    pub fn try_emit(&self, event: ImportEvent) -> bool {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit import event: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = EventHandle::new(tx);

        handle
            .emit(ImportEvent::ServiceStarted {
                version: "0.1.0".to_string(),
            })
            .await;

        let envelope = rx.recv().await.expect("Should receive event");
        assert!(matches!(envelope.event, ImportEvent::ServiceStarted { .. }));
    }

    #[test]
    fn test_try_emit_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = EventHandle::new(tx);
        let event = ImportEvent::ServiceStopped {
            reason: "test".to_string(),
        };

        assert!(handle.try_emit(event.clone()));
        assert!(!handle.try_emit(event));
    }

    #[test]
    fn test_try_emit_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = EventHandle::new(tx);
        assert!(!handle.try_emit(ImportEvent::ServiceStopped {
            reason: "test".to_string(),
        }));
    }
}
