use thiserror::Error;

/// Errors that can occur while ingesting a source file or one of its bodies.
///
/// A skipped file (sidecar metadata, duplicate) is not an error; see the
/// coordinator's `UnitOutcome::Skipped`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImportError {
    /// The `.p7m` envelope could not be unwrapped.
    #[error("envelope extraction failed: {0}")]
    EnvelopeExtraction(String),

    /// No encoding and parser combination produced a usable document.
    #[error("parse error: {0}")]
    Parse(String),

    /// Moving or copying the source file failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The per-document transaction failed or could not be committed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Reading a source file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    /// Short category label used in audit records and summaries.
    pub fn category(&self) -> &'static str {
        match self {
            Self::EnvelopeExtraction(_) => "envelope",
            Self::Parse(_) => "parse",
            Self::Storage(_) => "storage",
            Self::Persistence(_) => "persistence",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = ImportError::Parse("no FatturaElettronicaBody".into());
        assert_eq!(err.to_string(), "parse error: no FatturaElettronicaBody");
        assert_eq!(err.category(), "parse");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ImportError = io.into();
        assert_eq!(err.category(), "io");
    }
}
