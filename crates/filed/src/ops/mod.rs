//! File operation handlers.
//!
//! Each handler receives the already-split parameter list and returns the
//! reply chunks or an error. Handlers validate their own parameter counts
//! before touching the filesystem and know nothing about the transport.

use async_trait::async_trait;

mod checksum;
mod chmod;
mod chown;
mod cp;
mod mkdir;
mod mv;
mod rm;

pub use checksum::Checksum;
pub use chmod::Chmod;
pub use chown::Chown;
pub use cp::Cp;
pub use mkdir::Mkdir;
pub use mv::Mv;
pub use rm::Rm;

/// Errors surfaced to callers as the reply's error text.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("Incorrect number of parameters to {op}. Expected {expected} Got {actual}")]
    ParameterCount {
        op: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Unsupported command '{0}'")]
    UnsupportedCommand(String),
    #[error("invalid boolean '{0}'")]
    InvalidBool(String),
    #[error("Unsupported checksum algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("unsupported file mode {0}")]
    UnsupportedMode(String),
    #[error("invalid directory mode '{0}'")]
    InvalidDirectoryMode(String),
    #[error("invalid owner string: {0}")]
    InvalidOwner(String),
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("destination path already exists")]
    DestinationExists,
    #[error("Cannot mkdir {path}: subpath {ancestor} exists but is not a directory")]
    AncestorNotADirectory { path: String, ancestor: String },
    #[error("{command} failed: {stderr}")]
    Subprocess {
        command: &'static str,
        stderr: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One entry in the command dispatch table.
#[async_trait]
pub trait OpHandler: Send + Sync {
    /// Command name this handler serves.
    fn name(&self) -> &'static str;

    /// Execute against the positional parameter list.
    async fn execute(&self, params: &[String]) -> Result<Vec<String>, OpError>;
}

pub(crate) fn expect_params(
    op: &'static str,
    expected: usize,
    params: &[String],
) -> Result<(), OpError> {
    if params.len() != expected {
        return Err(OpError::ParameterCount {
            op,
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}

pub(crate) fn parse_bool(raw: &str) -> Result<bool, OpError> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        other => Err(OpError::InvalidBool(other.to_string())),
    }
}

/// Run a filesystem walk off the async runtime.
pub(crate) async fn run_blocking<T>(
    task: impl FnOnce() -> Result<T, OpError> + Send + 'static,
) -> Result<T, OpError>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| OpError::Io(std::io::Error::other(e)))?
}
