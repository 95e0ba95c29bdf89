//! Server-level error types and the process exit codes they map to.

use std::fmt;

/// Exit codes per the server's external interface contract.
pub mod exit_code {
    pub const COMMAND_LINE: i32 = 19;
    pub const PORT_UNAVAILABLE: i32 = 10;
    pub const SCRATCH_NOT_WRITABLE: i32 = 18;
    pub const CLASSIFIER_LOAD_FAILURE: i32 = 14;
}

/// Fatal startup or process-level errors. Anything a worker hits mid-request
/// is handled locally and never surfaces as one of these.
#[derive(Debug)]
pub enum ServerError {
    /// Malformed or missing CLI arguments.
    CommandLine(String),
    /// The requested port could not be bound.
    PortUnavailable(std::io::Error),
    /// The scratch file path could not be created or written during
    /// preflight.
    ScratchNotWritable(std::io::Error),
    /// The fixed-path prefix-response file could not be read during
    /// preflight. Not named by the external interface's exit-code table;
    /// treated as the same preflight-fatal class as the scratch file.
    PrefixResponseUnreadable(std::io::Error),
    /// A Haar cascade file failed to load.
    ClassifierLoadFailure(String),
}

impl ServerError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandLine(_) => exit_code::COMMAND_LINE,
            Self::PortUnavailable(_) => exit_code::PORT_UNAVAILABLE,
            Self::ScratchNotWritable(_) | Self::PrefixResponseUnreadable(_) => {
                exit_code::SCRATCH_NOT_WRITABLE
            },
            Self::ClassifierLoadFailure(_) => exit_code::CLASSIFIER_LOAD_FAILURE,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandLine(msg) => write!(f, "command line error: {msg}"),
            Self::PortUnavailable(err) => write!(f, "port unavailable: {err}"),
            Self::ScratchNotWritable(err) => write!(f, "scratch file not writable: {err}"),
            Self::PrefixResponseUnreadable(err) => write!(f, "prefix response file unreadable: {err}"),
            Self::ClassifierLoadFailure(msg) => write!(f, "classifier load failure: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PortUnavailable(err)
            | Self::ScratchNotWritable(err)
            | Self::PrefixResponseUnreadable(err) => Some(err),
            Self::CommandLine(_) | Self::ClassifierLoadFailure(_) => None,
        }
    }
}
