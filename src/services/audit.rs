use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::clock::Clock;
use crate::models::{AuditEvent, AuditEventType};
use crate::storage::AuditSink;

/// Best-effort writer for the payment lifecycle log.
///
/// Failures are logged and dropped; recording an event never fails the
/// payment path.
#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    pub async fn record(
        &self,
        track_id: &str,
        event_type: AuditEventType,
        correlation_id: Uuid,
        metadata: Value,
    ) {
        let event = AuditEvent {
            track_id: track_id.to_string(),
            event_type,
            metadata,
            correlation_id,
            timestamp: self.clock.now(),
        };

        match self.sink.append(&event).await {
            Ok(()) => tracing::debug!(
                track_id = track_id,
                correlation_id = %correlation_id,
                "Audit event {} recorded",
                event_type.as_str()
            ),
            Err(e) => tracing::warn!(
                track_id = track_id,
                correlation_id = %correlation_id,
                "Failed to record audit event {}: {}",
                event_type.as_str(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::storage::{MemoryAuditSink, StoreError};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        ))
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _event: &AuditEvent) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn records_events_in_order() {
        let sink = Arc::new(MemoryAuditSink::new());
        let clock = clock();
        let trail = AuditTrail::new(sink.clone(), clock.clone());
        let correlation = Uuid::new_v4();

        trail
            .record("track-1", AuditEventType::PaymentSubmitted, correlation, json!({}))
            .await;
        clock.advance(chrono::Duration::seconds(5));
        trail
            .record(
                "track-1",
                AuditEventType::VerificationStarted,
                correlation,
                json!({"attempt": 1}),
            )
            .await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::PaymentSubmitted);
        assert_eq!(events[1].metadata["attempt"], json!(1));
        assert!(events.iter().all(|e| e.correlation_id == correlation));
        assert_eq!(
            events[0].timestamp,
            Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
        );
        assert_eq!(events[1].timestamp, clock.now());
    }

    #[tokio::test]
    async fn sink_failures_are_swallowed() {
        let trail = AuditTrail::new(Arc::new(BrokenSink), clock());
        trail
            .record(
                "track-1",
                AuditEventType::ChallengeCreated,
                Uuid::new_v4(),
                json!({}),
            )
            .await;
    }
}
