//! In-memory [`AuditSink`] for tests.

use std::sync::Mutex;

use crate::audit::{AuditEvent, AuditSink};

/// Records every event in order, for assertion in tests.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[tokio::test]
    async fn test_record_appends_event() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditEvent::new(None, "DEVICE_VALIDATED", "dev-1", SystemTime::now()))
            .await;
        assert_eq!(sink.events().len(), 1);
    }
}
