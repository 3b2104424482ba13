/// Base error type for subprocess operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("subprocess failed: {command}: {source}")]
    Subprocess {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("subprocess timed out: {command}")]
    SubprocessTimeout { command: String },

    #[error("subprocess produced more than {limit} bytes: {command}")]
    SubprocessOutputLimit { command: String, limit: usize },
}
