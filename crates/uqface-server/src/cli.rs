//! Hand-parsed command-line arguments.
//!
//! The external interface pins exact exit codes to exact failure
//! conditions; a derive-based parser's own usage-error exit code would not
//! match, so argument validation is written out by hand here instead.

use std::path::PathBuf;

use crate::config::{RequestedPort, ServerConfig};
use crate::error::ServerError;

const MAX_CONNECTION_LIMIT: u32 = 10_000;

/// Paths to the fixed-location resources the external interface assumes
/// are "known at build time". Exposed as fields (rather than hardcoded)
/// so tests can point them at a temporary directory.
#[derive(Debug, Clone)]
pub struct FixedPaths {
    pub face_cascade: PathBuf,
    pub eye_cascade: PathBuf,
    pub scratch: PathBuf,
    pub prefix_response: PathBuf,
}

/// Parse `args` (excluding argv[0]) into a [`ServerConfig`].
pub fn parse(args: &[String], paths: FixedPaths) -> Result<ServerConfig, ServerError> {
    if args.len() < 2 || args.len() > 3 {
        return Err(usage_error());
    }

    let max_connections = parse_connection_limit(&args[0])?;
    let max_image_bytes = parse_max_size(&args[1])?;
    let port = match args.get(2) {
        None => RequestedPort::Ephemeral,
        Some(raw) => parse_port(raw)?,
    };

    Ok(ServerConfig {
        max_connections,
        max_image_bytes,
        port,
        face_cascade_path: paths.face_cascade,
        eye_cascade_path: paths.eye_cascade,
        scratch_path: paths.scratch,
        prefix_response_path: paths.prefix_response,
    })
}

fn parse_connection_limit(raw: &str) -> Result<u32, ServerError> {
    let value: u32 = raw.parse().map_err(|_| usage_error())?;
    if value > MAX_CONNECTION_LIMIT {
        return Err(usage_error());
    }
    Ok(value)
}

fn parse_max_size(raw: &str) -> Result<u32, ServerError> {
    let value: u32 = raw.parse().map_err(|_| usage_error())?;
    if value == 0 {
        Ok(u32::MAX)
    } else {
        Ok(value)
    }
}

fn parse_port(raw: &str) -> Result<RequestedPort, ServerError> {
    if raw.is_empty() {
        return Err(usage_error());
    }
    if raw == "0" {
        return Ok(RequestedPort::Ephemeral);
    }
    raw.parse().map(RequestedPort::Fixed).map_err(|_| usage_error())
}

fn usage_error() -> ServerError {
    ServerError::CommandLine(
        "usage: uqfaceserver connectionlimit maxsize [portnumber]".to_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::{parse, FixedPaths};
    use crate::config::RequestedPort;

    fn paths() -> FixedPaths {
        FixedPaths {
            face_cascade: "face.xml".into(),
            eye_cascade: "eye.xml".into(),
            scratch: "scratch.jpg".into(),
            prefix_response: "prefix.bin".into(),
        }
    }

    #[test]
    fn parses_minimal_args_with_ephemeral_port() {
        let args = vec!["0".to_owned(), "0".to_owned()];
        let config = parse(&args, paths()).expect("parse");
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.max_image_bytes, u32::MAX);
        assert_eq!(config.port, RequestedPort::Ephemeral);
    }

    #[test]
    fn zero_port_literal_means_ephemeral() {
        let args = vec!["5".to_owned(), "1024".to_owned(), "0".to_owned()];
        let config = parse(&args, paths()).expect("parse");
        assert_eq!(config.port, RequestedPort::Ephemeral);
    }

    #[test]
    fn fixed_port_is_parsed() {
        let args = vec!["5".to_owned(), "1024".to_owned(), "9000".to_owned()];
        let config = parse(&args, paths()).expect("parse");
        assert_eq!(config.port, RequestedPort::Fixed(9000));
    }

    #[test]
    fn rejects_connection_limit_over_cap() {
        let args = vec!["10001".to_owned(), "0".to_owned()];
        assert!(parse(&args, paths()).is_err());
    }

    #[test]
    fn rejects_missing_arguments() {
        let args = vec!["5".to_owned()];
        assert!(parse(&args, paths()).is_err());
    }

    #[test]
    fn rejects_non_numeric_arguments() {
        let args = vec!["five".to_owned(), "0".to_owned()];
        assert!(parse(&args, paths()).is_err());
    }
}
