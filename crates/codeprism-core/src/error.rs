/// Unified error type for codeprism.
#[derive(Debug, thiserror::Error)]
pub enum CodeprismError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Vector error: {0}")]
    Vector(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Git error: {0}")]
    Git(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Invalid file role: {0}")]
    InvalidRole(String),

    #[error("Invalid edge relation: {0}")]
    InvalidRelation(String),

    #[error("Invalid card type: {0}")]
    InvalidCardType(String),

    #[error("Invalid doc type: {0}")]
    InvalidDocType(String),

    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    #[error("Invalid file status: {0}")]
    InvalidFileStatus(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodeprismError {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_mentions_path() {
        let err = CodeprismError::parse("app/models/patient.rb", "unexpected end of input");
        let msg = err.to_string();
        assert!(msg.contains("app/models/patient.rb"));
        assert!(msg.contains("unexpected end of input"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CodeprismError = io.into();
        assert!(matches!(err, CodeprismError::Io(_)));
    }
}
