//! `uqfaceserver` binary: parses its CLI, runs preflight, binds, and then
//! runs the acceptor and the statistics reporter concurrently until killed.

use std::path::PathBuf;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uqface_core::OpenCvDetector;
use uqface_server::cli::{self, FixedPaths};
use uqface_server::error::ServerError;
use uqface_server::BoundServer;

const FACE_CASCADE_PATH: &str = "/usr/local/share/uqface/haarcascade_frontalface_default.xml";
const EYE_CASCADE_PATH: &str = "/usr/local/share/uqface/haarcascade_eye.xml";
const SCRATCH_PATH: &str = "/var/tmp/uqface-scratch.jpg";
const PREFIX_RESPONSE_PATH: &str = "/usr/local/share/uqface/prefix-response.bin";

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let paths = FixedPaths {
        face_cascade: PathBuf::from(FACE_CASCADE_PATH),
        eye_cascade: PathBuf::from(EYE_CASCADE_PATH),
        scratch: PathBuf::from(SCRATCH_PATH),
        prefix_response: PathBuf::from(PREFIX_RESPONSE_PATH),
    };

    let config = match cli::parse(&args, paths) {
        Ok(config) => config,
        Err(err) => fail(&err),
    };

    let detector = match OpenCvDetector::load(
        &config.face_cascade_path,
        &config.eye_cascade_path,
        config.scratch_path.clone(),
    ) {
        Ok(detector) => detector,
        Err(err) => fail(&ServerError::ClassifierLoadFailure(err.to_string())),
    };

    let server = match BoundServer::bind(&config, detector).await {
        Ok(server) => server,
        Err(err) => fail(&err),
    };

    let local_addr = server.local_addr().unwrap_or_else(|err| {
        fail(&ServerError::PortUnavailable(err));
    });
    report_bound_port(local_addr.port());

    let stats = server.stats();
    let reporter = tokio::spawn(uqface_core::run_reporter(stats));
    let acceptor = tokio::spawn(server.serve());

    let _ = tokio::join!(reporter, acceptor);
}

/// Write the bound port, as a decimal followed by a newline, directly to
/// the diagnostic stream — a contract other tooling scrapes, so this
/// bypasses the tracing formatter the same way the reporter's output does.
fn report_bound_port(port: u16) {
    use std::io::Write as _;
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "{port}");
    let _ = stderr.flush();
}

fn fail(err: &ServerError) -> ! {
    tracing::error!(%err, "fatal startup error");
    report_fatal_error(err);
    std::process::exit(err.exit_code());
}

fn report_fatal_error(err: &ServerError) {
    use std::io::Write as _;
    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "uqfaceserver: {err}");
}
