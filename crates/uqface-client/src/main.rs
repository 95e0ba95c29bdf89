//! `uqfaceclient` binary: parses its CLI, runs one request/response
//! exchange against the server, and exits with the matching status code.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uqface_client::cli;
use uqface_client::driver::{self, format_server_error_message, Io};
use uqface_client::error::ClientError;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match cli::parse(&args) {
        Ok(config) => config,
        Err(err) => fail(&err),
    };

    let mut io = Io { stdin: tokio::io::stdin(), stdout: tokio::io::stdout() };
    if let Err(err) = driver::run(&config, &mut io).await {
        fail(&err);
    }
}

fn fail(err: &ClientError) -> ! {
    use std::io::Write as _;
    let mut stderr = std::io::stderr();

    if let ClientError::ServerErrorResponse(message) = err {
        let _ = write!(stderr, "{}", format_server_error_message(message));
    } else {
        let _ = writeln!(stderr, "uqfaceclient: {err}");
    }

    tracing::error!(%err, "client exiting with error");
    std::process::exit(err.exit_code());
}
