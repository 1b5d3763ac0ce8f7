use thiserror::Error;

/// Everything that can stop a run from starting or finishing.
///
/// Chip defects are not errors: they end up in the verdict.
#[derive(Debug, Error)]
pub enum TesterError {
    #[error("{family}: chip pin {pin} is outside its {pin_count}-pin package")]
    PinOutOfRange {
        family: String,
        pin: u8,
        pin_count: u8,
    },

    #[error("{pins}-pin package does not fit the {socket}-pin socket")]
    PackageTooLarge { pins: u8, socket: u8 },

    #[error("{family}: chip pin {pin} is claimed by both {first} and {second}")]
    PinConflict {
        family: String,
        pin: u8,
        first: String,
        second: String,
    },

    #[error("{family}: {reason}")]
    InvalidProfile { family: String, reason: String },

    #[error("no family matches {0}")]
    NoMatch(String),

    #[error("{code} matches several families: {}", families.join(", "))]
    Ambiguous { code: String, families: Vec<String> },

    #[error("{family} does not support {operation}")]
    Unsupported { family: String, operation: String },

    #[error("a run is already active on the socket")]
    SocketBusy,

    #[error("run handle does not belong to the active run")]
    StaleHandle,

    #[error(
        "refresh deadline missed: {elapsed_us} us since last sweep, budget {budget_us} us"
    )]
    RefreshDeadline { elapsed_us: u64, budget_us: u64 },

    #[error("image stream: {0}")]
    Stream(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl TesterError {
    /// True for faults of the tester itself, as opposed to operator or data errors.
    pub fn is_internal_fault(&self) -> bool {
        matches!(self, TesterError::RefreshDeadline { .. })
    }
}

pub type Result<T> = std::result::Result<T, TesterError>;
