use thiserror::Error;

/// Failures surfaced to the caller. Unresolvable expressions are never errors.
#[derive(Debug, Error)]
pub enum CoreError {
  #[error("Failed to parse module: {message}")]
  Parse { message: String },
  #[error("Invalid configuration: {0}")]
  Config(#[from] serde_json::Error),
  #[error(
    "{prefix} isn't a valid CSS identifier. Accepted characters are ^[a-zA-Z\\-_]+[a-zA-Z\\-_0-9]*$"
  )]
  InvalidClassHashPrefix { prefix: String },
  #[error("Class {class_name} is already registered as `{existing}`, not `{incoming}`")]
  ClassNameCollision {
    class_name: String,
    existing: String,
    incoming: String,
  },
}
