use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Severity of an import event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink for structured import events (`file_imported`, `file_skipped`,
/// `file_failed`, `archive_failed`, ...).
pub trait EventLog {
    fn log(&self, action: &str, level: EventLevel, fields: &[(&str, String)]);
}

/// Forwards events to `tracing` with `component = "import"`. The `file`,
/// `reason`, `error` and `document_id` fields are recorded as tracing
/// fields of their own; any other keys are joined into `fields`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog;

const NAMED_FIELDS: [&str; 4] = ["file", "reason", "error", "document_id"];

fn field<'a>(fields: &'a [(&str, String)], name: &str) -> Option<&'a str> {
    fields.iter().find(|(k, _)| *k == name).map(|(_, v)| v.as_str())
}

fn leftover(fields: &[(&str, String)]) -> Option<String> {
    let rest = fields
        .iter()
        .filter(|(k, _)| !NAMED_FIELDS.contains(k))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>();
    if rest.is_empty() { None } else { Some(rest.join(" ")) }
}

impl EventLog for TracingEventLog {
    fn log(&self, action: &str, level: EventLevel, fields: &[(&str, String)]) {
        let file = field(fields, "file");
        let reason = field(fields, "reason");
        let err = field(fields, "error");
        let document_id = field(fields, "document_id");
        let rest = leftover(fields);
        let rest = rest.as_deref();
        match level {
            EventLevel::Debug => {
                debug!(component = "import", action, file, reason, error = err, document_id, fields = rest)
            }
            EventLevel::Info => {
                info!(component = "import", action, file, reason, error = err, document_id, fields = rest)
            }
            EventLevel::Warn => {
                warn!(component = "import", action, file, reason, error = err, document_id, fields = rest)
            }
            EventLevel::Error => {
                error!(component = "import", action, file, reason, error = err, document_id, fields = rest)
            }
        }
    }
}
