//! Draining the event bus into outbound notifications.

mod dispatcher;
#[cfg(feature = "webhook")]
mod webhook;

pub use dispatcher::{DispatchStats, Dispatcher, StatsSnapshot};
#[cfg(feature = "webhook")]
pub use webhook::{WebhookSink, WebhookSinkBuilder};

use crate::entry::{Status, TransitionEvent};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Destination for transition notifications.
///
/// Implementations perform one best-effort delivery per call; the dispatcher
/// never retries.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed; the dispatcher logs it and moves on.
    async fn deliver(&self, event: &TransitionEvent) -> Result<()>;

    /// Get a human-readable name for this sink (for logging/debugging).
    fn name(&self) -> String;
}

/// JSON body sent for each event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload<'a> {
    /// Full entry path.
    pub entry_id: &'a str,
    /// Human-readable application name.
    pub display_name: &'a str,
    /// `"on"` or `"off"`.
    pub status: Status,
}

impl<'a> From<&'a TransitionEvent> for NotificationPayload<'a> {
    fn from(event: &'a TransitionEvent) -> Self {
        Self {
            entry_id: event.entry_id.as_str(),
            display_name: event.entry_id.display_name(),
            status: event.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryId;
    use chrono::Utc;

    #[test]
    fn test_payload_shape() {
        let event = TransitionEvent {
            entry_id: EntryId::new(r"Cam\NonPackaged\C:#Apps#obs64.exe"),
            active: false,
            observed_at: Utc::now(),
        };
        let json = serde_json::to_value(NotificationPayload::from(&event)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "entry_id": r"Cam\NonPackaged\C:#Apps#obs64.exe",
                "display_name": "obs64.exe",
                "status": "off",
            })
        );
    }
}
