//! Runtime gateway error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("unexpected output from `{command}`: {detail}")]
    Parse { command: String, detail: String },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
