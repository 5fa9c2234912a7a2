use thiserror::Error;

/// Typed error hierarchy for the pipeline.
///
/// Stage runners catch these per item and record them in the run report;
/// only store-level failures abort a whole run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("State store: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Json(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("{0}")]
    Collaborator(String),

    #[error("Missing precondition: {0}")]
    Precondition(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type AppResult<T> = Result<T, AppError>;

// ── From impls ─────────────────────────────────────────────────────────────

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json(e.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Http(e.to_string())
    }
}

/// Allows `.map_err(|e| format!("…", e))?` and `ok_or_else(|| format!(…))?`
/// to coerce into AppError without changing the call sites.
impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

/// Allows `.ok_or("literal string")?` to coerce into AppError.
impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Other(s.to_string())
    }
}
