//! Append-only audit trail of ticket lifecycle events.

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::{
    domain::{TicketId, UserId},
    errors::Error,
    formatting::truncate_text,
    ticket::{StatusSource, TicketStatus, TransitionOutcome},
    Result,
};

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<TicketStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<TicketStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<StatusSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TransitionOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    fn base(event: &'static str, actor: UserId) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event,
            actor: Some(actor.0),
            ticket_id: None,
            from: None,
            to: None,
            source: None,
            outcome: None,
            attachments: None,
            content: None,
            reason: None,
        }
    }

    pub fn ticket_created(
        owner: UserId,
        ticket_id: TicketId,
        text: &str,
        attachments: usize,
    ) -> Self {
        Self {
            ticket_id: Some(ticket_id.0),
            content: Some(text.to_string()),
            attachments: Some(attachments),
            ..Self::base("ticket_created", owner)
        }
    }

    pub fn status_change(
        actor: UserId,
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
        source: StatusSource,
        outcome: TransitionOutcome,
    ) -> Self {
        Self {
            ticket_id: Some(ticket_id.0),
            from: Some(from),
            to: Some(to),
            source: Some(source),
            outcome: Some(outcome),
            ..Self::base("status_change", actor)
        }
    }

    pub fn access_denied(actor: UserId, source: StatusSource, reason: &str) -> Self {
        Self {
            source: Some(source),
            reason: Some(reason.to_string()),
            ..Self::base("access_denied", actor)
        }
    }

    pub fn owner_cancel(owner: UserId, ticket_id: TicketId, accepted: bool) -> Self {
        Self {
            ticket_id: Some(ticket_id.0),
            source: Some(StatusSource::OwnerCancel),
            reason: (!accepted).then(|| "not owner or not active".to_string()),
            ..Self::base("owner_cancel", owner)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.content {
            event.content = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text, one block per event.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// Write and swallow failures; the audit trail never fails a request.
    pub fn record(&self, event: AuditEvent) {
        let name = event.event;
        if let Err(e) = self.write(event) {
            warn!(event = name, error = %e, "audit write failed");
        }
    }
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

#[cfg(test)]
pub(crate) fn tmp_audit_path(prefix: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let pid = std::process::id();
    std::env::temp_dir().join(format!("{prefix}-{pid}-{ts}.log"))
}
