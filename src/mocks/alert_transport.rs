//! In-memory [`AlertTransport`] for tests.

use std::sync::Mutex;

use crate::adapters::{AlertTransport, BoxFuture, StoreError};
use crate::risk::alert::SecurityAlert;

/// Records every alert sent to it, in order, for assertion in tests.
#[derive(Default)]
pub struct InMemoryAlertTransport {
    sent: Mutex<Vec<SecurityAlert>>,
}

impl InMemoryAlertTransport {
    /// An empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every alert sent so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SecurityAlert> {
        self.sent.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl AlertTransport for InMemoryAlertTransport {
    fn send(&self, alert: SecurityAlert) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(alert);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::risk::alert::AlertSeverity;
    use std::time::SystemTime;

    #[tokio::test]
    async fn test_send_is_recorded_and_observable() {
        let transport = InMemoryAlertTransport::new();
        transport
            .send(SecurityAlert::new(
                crate::risk::alert::AlertKind::VpnAsn,
                UserId::new(),
                AlertSeverity::Medium,
                SystemTime::now(),
            ))
            .await
            .expect("send succeeds");
        assert_eq!(transport.sent().len(), 1);
    }
}
