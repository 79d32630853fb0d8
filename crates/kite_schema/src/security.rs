//! Security log records and sinks.

use crate::auth::{SecurityLogType, Severity};
use crate::context::RequestContext;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

/// One security-relevant event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRecord {
    pub log_type: SecurityLogType,
    pub severity: Severity,
    /// The message template as declared.
    pub template: String,
    /// Positional values for the template placeholders.
    pub arguments: Vec<String>,
    pub user: Option<String>,
    pub client_id: Option<String>,
    pub remote_address: Option<String>,
    pub request_id: Option<String>,
}

impl SecurityRecord {
    pub fn new(
        log_type: SecurityLogType,
        severity: Severity,
        context: &RequestContext,
        template: impl Into<String>,
        arguments: Vec<String>,
    ) -> Self {
        Self {
            log_type,
            severity,
            template: template.into(),
            arguments,
            user: context.user().map(|u| u.login.clone()),
            client_id: context.client_id().map(str::to_string),
            remote_address: context.remote_address.clone(),
            request_id: context.request_id.clone(),
        }
    }

    /// Renders the template, filling `{...}` placeholders in order.
    ///
    /// Placeholders without a matching argument are kept verbatim.
    pub fn message(&self) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut args = self.arguments.iter();
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            match args.next() {
                Some(arg) => out.push_str(arg),
                None => out.push_str(&rest[start..=start + len]),
            }
            rest = &rest[start + len + 1..];
        }

        out.push_str(rest);
        out
    }
}

/// Receives security records.
pub trait SecurityLogger: Send + Sync + Debug {
    fn record(&self, record: SecurityRecord);
}

/// Emits records as `tracing` events on the `kite::security` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSecurityLogger;

impl SecurityLogger for TracingSecurityLogger {
    fn record(&self, record: SecurityRecord) {
        let message = record.message();
        let user = record.user.as_deref().unwrap_or("-");
        let client = record.client_id.as_deref().unwrap_or("-");
        match record.severity {
            Severity::Trivial | Severity::Minor => tracing::info!(
                target: "kite::security",
                log_type = ?record.log_type,
                severity = ?record.severity,
                user,
                client,
                "{message}"
            ),
            Severity::Major | Severity::Crucial => tracing::warn!(
                target: "kite::security",
                log_type = ?record.log_type,
                severity = ?record.severity,
                user,
                client,
                "{message}"
            ),
        }
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct RecordingSecurityLogger {
    records: Mutex<Vec<SecurityRecord>>,
}

impl RecordingSecurityLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the records collected so far.
    pub fn records(&self) -> Vec<SecurityRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns the collected records.
    pub fn take(&self) -> Vec<SecurityRecord> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecurityLogger for RecordingSecurityLogger {
    fn record(&self, record: SecurityRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
