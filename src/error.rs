use serde::Serialize;
use thiserror::Error;

/// Errors produced by an analysis run.
///
/// `Decode` and `InsufficientVoicing` are user-facing and terminal for the
/// run. `InvalidRange` is a contract violation by the caller. `Cancelled`
/// marks a run that was superseded by a newer one and is never reported.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("not enough pitched content: {voiced} voiced frame(s) out of {total}")]
    InsufficientVoicing { voiced: usize, total: usize },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("analysis run was superseded")]
    Cancelled,
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Decode(_) => "DecodeError",
            AnalysisError::InsufficientVoicing { .. } => "InsufficientVoicingError",
            AnalysisError::InvalidRange(_) => "InvalidRangeError",
            AnalysisError::Cancelled => "Cancelled",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Structured `{kind, message}` form handed to whatever transports results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_uses_taxonomy_names() {
        let err = AnalysisError::InsufficientVoicing { voiced: 1, total: 40 };
        let report = err.report();
        assert_eq!(report.kind, "InsufficientVoicingError");
        assert!(report.message.contains("1 voiced frame"));

        let json = serde_json::to_string(&AnalysisError::Decode("empty".into()).report()).unwrap();
        assert_eq!(json, r#"{"kind":"DecodeError","message":"could not decode audio: empty"}"#);
    }
}
