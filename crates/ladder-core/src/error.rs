use thiserror::Error;

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("program load failed: {0}")]
    ProgramLoad(String),

    #[error("unknown instruction type: {0}")]
    UnknownInstruction(String),

    #[error("instruction {kind} in rung {rung} is missing required field '{field}'")]
    MissingField {
        rung: i64,
        kind: String,
        field: &'static str,
    },

    #[error("invalid tag name '{0}': expected dot-separated identifiers")]
    InvalidTagName(String),

    #[error("tag '{0}' is reserved for the runtime and cannot be written by a program")]
    ReservedTag(String),

    #[error("invalid preset {preset} for {kind} '{tag}': must not be negative")]
    InvalidPreset {
        kind: String,
        tag: String,
        preset: f64,
    },

    #[error("I/O configuration error: {0}")]
    IoConfig(String),

    #[error("I/O adapter fault: {0}")]
    Adapter(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("scan cycle fault: {0}")]
    ScanFault(String),

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LadderError>;
