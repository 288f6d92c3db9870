#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid schema for field '{field}': {reason}")]
    Schema { field: String, reason: String },

    #[error("Malformed schema document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}
