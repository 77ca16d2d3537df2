use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScribeError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Degenerate reference rect ({width}x{height})")]
    DegenerateGeometry { width: f64, height: f64 },

    #[error("Image decode error: {0}")]
    Decode(String),

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("LLM backend error: {0}")]
    Backend(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Step store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl ScribeError {
    /// True for errors caused by the request itself rather than by a backend or the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScribeError::InputValidation(_) | ScribeError::Decode(_))
    }
}

impl serde::Serialize for ScribeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ScribeResult<T> = Result<T, ScribeError>;
