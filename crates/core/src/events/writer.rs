use std::sync::Arc;

use tokio::sync::mpsc;

use super::{EventEnvelope, EventHandle, EventRecord, EventStore};

/// Background task that drains emitted events into an [`EventStore`].
pub struct EventWriter {
    rx: mpsc::Receiver<EventEnvelope>,
    store: Arc<dyn EventStore>,
}

impl EventWriter {
    pub fn new(rx: mpsc::Receiver<EventEnvelope>, store: Arc<dyn EventStore>) -> Self {
        Self { rx, store }
    }

    /// Consume events until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Event writer started");

        while let Some(envelope) = self.rx.recv().await {
            let record = EventRecord {
                id: 0,
                timestamp: envelope.timestamp,
                event_type: envelope.event.event_type().to_string(),
                session_id: envelope.event.session_id().map(String::from),
                task_id: envelope.event.task_id().map(String::from),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write import event: {}", e);
            }
        }

        tracing::info!("Event writer shutting down");
    }
}

/// Create a handle/writer pair sharing a channel of `buffer_size`.
///
/// Spawn the writer with `tokio::spawn(writer.run())`.
pub fn create_event_system(
    store: Arc<dyn EventStore>,
    buffer_size: usize,
) -> (EventHandle, EventWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventHandle::new(tx), EventWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::events::{EventError, EventFilter, ImportEvent};

    struct MockStore {
        records: Mutex<Vec<EventRecord>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn len(&self) -> usize {
            self.records.lock().unwrap().len()
        }
    }

    impl EventStore for MockStore {
        fn insert(&self, record: &EventRecord) -> Result<i64, EventError> {
            if self.should_fail {
                return Err(EventError::Database("mock failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            records.push(record.clone());
            Ok(records.len() as i64)
        }

        fn query(&self, _filter: &EventFilter) -> Result<Vec<EventRecord>, EventError> {
            Ok(self.records.lock().unwrap().clone())
        }

        fn count(&self, _filter: &EventFilter) -> Result<i64, EventError> {
            Ok(self.len() as i64)
        }
    }

    #[tokio::test]
    async fn test_writer_persists_events() {
        let store = Arc::new(MockStore::new());
        let (handle, writer) = create_event_system(store.clone(), 10);
        let writer_task = tokio::spawn(writer.run());

        handle
            .emit(ImportEvent::SessionStarted {
                session_id: "s1".to_string(),
                paths: vec!["/music/in".to_string()],
            })
            .await;
        handle
            .emit(ImportEvent::TaskSkipped {
                session_id: "s1".to_string(),
                task_id: Some("3".to_string()),
                reason: "user".to_string(),
            })
            .await;

        drop(handle);
        writer_task.await.unwrap();

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "session_started");
        assert_eq!(records[1].session_id.as_deref(), Some("s1"));
        assert_eq!(records[1].task_id.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_writer_survives_store_errors() {
        let store = Arc::new(MockStore::failing());
        let (handle, writer) = create_event_system(store.clone(), 10);
        let writer_task = tokio::spawn(writer.run());

        handle
            .emit(ImportEvent::ServiceStopped {
                reason: "test".to_string(),
            })
            .await;

        drop(handle);
        writer_task.await.unwrap();
        assert_eq!(store.len(), 0);
    }
}
