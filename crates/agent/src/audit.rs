use tracing::{info, warn};

use paintquote_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Forwards audit events to the tracing subscriber as structured log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let company_id = event.company_id.map(|id| id.to_string()).unwrap_or_default();
        let session_id = event.session_id.as_deref().unwrap_or("unknown");
        let quote_id = event.quote_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown");
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success => info!(
                event_name = %event.event_type,
                category = ?event.category,
                correlation_id = %event.correlation_id,
                company_id = %company_id,
                session_id,
                quote_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                event_name = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                company_id = %company_id,
                session_id,
                quote_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
