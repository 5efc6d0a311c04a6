use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("restore tool '{0}' not found on PATH")]
    NotInstalled(String),

    #[error("unable to run restore tool: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("restore failed: {output}")]
    Failed { output: String },

    #[error("restore output parsing failed ({reason}): {output}")]
    Parse { reason: String, output: String },
}
