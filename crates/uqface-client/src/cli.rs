//! Command-line arguments, via `clap`'s derive parser — the same tool and
//! style the server's own `Args` struct would use — but driven through
//! `try_parse_from` rather than `Parser::parse()`.
//!
//! Exact exit codes are pinned to exact failure conditions here, so a
//! malformed invocation must surface as our own [`ClientError`] rather than
//! clap's own usage-error exit(2) convention; `try_parse_from` gives us the
//! `Result` that convention would otherwise short-circuit.

use std::path::PathBuf;

use clap::Parser;

use crate::config::ClientConfig;
use crate::error::ClientError;

#[derive(Parser, Debug)]
#[command(name = "uqfaceclient", disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// TCP port `uqfaceserver` is listening on.
    port: u16,

    /// Replacement image to composite over each detected face.
    #[arg(long = "replacefile", value_name = "F", value_parser = non_empty_path, action = clap::ArgAction::Append)]
    replace_file: Vec<PathBuf>,

    /// Where to write the result image; defaults to standard output.
    #[arg(long = "outputfilename", value_name = "F", value_parser = non_empty_path, action = clap::ArgAction::Append)]
    output_file: Vec<PathBuf>,

    /// Primary image to submit; defaults to standard input.
    #[arg(long = "detectfile", value_name = "F", value_parser = non_empty_path, action = clap::ArgAction::Append)]
    detect_file: Vec<PathBuf>,
}

fn non_empty_path(value: &str) -> Result<PathBuf, String> {
    if value.is_empty() {
        Err("filename must not be empty".to_owned())
    } else {
        Ok(PathBuf::from(value))
    }
}

/// Parse `args` (excluding argv[0]) into a [`ClientConfig`].
pub fn parse(args: &[String]) -> Result<ClientConfig, ClientError> {
    let argv = std::iter::once("uqfaceclient".to_owned()).chain(args.iter().cloned());
    let parsed = Args::try_parse_from(argv).map_err(|_| usage_error())?;

    Ok(ClientConfig {
        port: parsed.port,
        replace_file: at_most_one(parsed.replace_file)?,
        output_file: at_most_one(parsed.output_file)?,
        detect_file: at_most_one(parsed.detect_file)?,
    })
}

/// Each flag is optional but may be given at most once; `ArgAction::Append`
/// collects every occurrence so this can reject the second one explicitly
/// rather than silently letting the last value win.
fn at_most_one(mut values: Vec<PathBuf>) -> Result<Option<PathBuf>, ClientError> {
    match values.len() {
        0 => Ok(None),
        1 => Ok(values.pop()),
        _ => Err(usage_error()),
    }
}

fn usage_error() -> ClientError {
    ClientError::CommandLine(
        "usage: uqfaceclient portnum [--replacefile F] [--outputfilename F] [--detectfile F]"
            .to_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::parse;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn parses_port_only() {
        let config = parse(&args(&["9000"])).expect("parse");
        assert_eq!(config.port, 9000);
        assert_eq!(config.replace_file, None);
        assert_eq!(config.output_file, None);
        assert_eq!(config.detect_file, None);
    }

    #[test]
    fn parses_all_flags_in_any_order() {
        let config = parse(&args(&[
            "9000",
            "--outputfilename",
            "out.jpg",
            "--detectfile",
            "in.jpg",
            "--replacefile",
            "rep.jpg",
        ]))
        .expect("parse");
        assert_eq!(config.replace_file.as_deref(), Some(std::path::Path::new("rep.jpg")));
        assert_eq!(config.output_file.as_deref(), Some(std::path::Path::new("out.jpg")));
        assert_eq!(config.detect_file.as_deref(), Some(std::path::Path::new("in.jpg")));
    }

    #[test]
    fn rejects_missing_port() {
        assert!(parse(&args(&[])).is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse(&args(&["notaport"])).is_err());
    }

    #[test]
    fn rejects_duplicate_flag() {
        let result = parse(&args(&["9000", "--detectfile", "a.jpg", "--detectfile", "b.jpg"]));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_flag_missing_value() {
        assert!(parse(&args(&["9000", "--detectfile"])).is_err());
    }

    #[test]
    fn rejects_empty_filename() {
        assert!(parse(&args(&["9000", "--detectfile", ""])).is_err());
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(parse(&args(&["9000", "--bogus", "x"])).is_err());
    }
}
