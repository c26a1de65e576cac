use thiserror::Error;

pub type Result<T> = std::result::Result<T, WardenError>;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Adapter load error ({tool}): {message}")]
    AdapterLoad { tool: String, message: String },

    #[error("Tool {tool} timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: std::time::Duration },

    #[error("Tool execution error ({tool}): {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Destructive operation denied by safety gate: {0}")]
    SafetyGateDenied(String),

    #[error("Collaborator {name} failed: {message}")]
    Collaborator { name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run directory error ({path}): {message}")]
    RunDir { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Convenience constructor for collaborator failures.
    pub fn collaborator(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error when it reaches the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Toml(_) => 2,
            Self::RunDir { .. } => 3,
            _ => 1,
        }
    }
}
