//! Client-level error types and the process exit codes they map to.

use std::fmt;

/// Exit codes per the client's external interface contract.
pub mod exit_code {
    pub const COMMAND_LINE: i32 = 16;
    pub const INPUT_UNREADABLE: i32 = 13;
    pub const OUTPUT_UNWRITABLE: i32 = 5;
    pub const SERVER_UNREACHABLE: i32 = 19;
    pub const COMMUNICATION_ERROR: i32 = 9;
    pub const SERVER_ERROR_RESPONSE: i32 = 11;
}

/// Every way a client invocation can end unsuccessfully.
#[derive(Debug)]
pub enum ClientError {
    /// Malformed, missing, or duplicated CLI arguments.
    CommandLine(String),
    /// The detect or replacement input file could not be read.
    InputUnreadable(std::io::Error),
    /// The output file could not be written.
    OutputUnwritable(std::io::Error),
    /// The TCP connection to the server could not be established.
    ServerUnreachable(std::io::Error),
    /// Any other I/O or protocol-decode failure while talking to the
    /// server (short read, bad magic, unknown response op).
    CommunicationError(String),
    /// The server sent back an `op=3` error response.
    ServerErrorResponse(String),
}

impl ClientError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CommandLine(_) => exit_code::COMMAND_LINE,
            Self::InputUnreadable(_) => exit_code::INPUT_UNREADABLE,
            Self::OutputUnwritable(_) => exit_code::OUTPUT_UNWRITABLE,
            Self::ServerUnreachable(_) => exit_code::SERVER_UNREACHABLE,
            Self::CommunicationError(_) => exit_code::COMMUNICATION_ERROR,
            Self::ServerErrorResponse(_) => exit_code::SERVER_ERROR_RESPONSE,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandLine(msg) => write!(f, "command line error: {msg}"),
            Self::InputUnreadable(err) => write!(f, "input file unreadable: {err}"),
            Self::OutputUnwritable(err) => write!(f, "output file unwritable: {err}"),
            Self::ServerUnreachable(err) => write!(f, "server unreachable: {err}"),
            Self::CommunicationError(msg) => write!(f, "communication error: {msg}"),
            Self::ServerErrorResponse(msg) => write!(f, "server returned an error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InputUnreadable(err) | Self::OutputUnwritable(err) | Self::ServerUnreachable(err) => {
                Some(err)
            },
            Self::CommandLine(_) | Self::CommunicationError(_) | Self::ServerErrorResponse(_) => None,
        }
    }
}
