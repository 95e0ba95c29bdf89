//! The client driver (section 4.7): reads input images, frames a request,
//! talks to the server, and dispatches the response.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use uqface_proto::{read_response, Frame};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Everything the driver needs beyond parsed arguments: where to read the
/// primary image from when no `--detectfile` was given, and where to
/// write a successful image response when no `--outputfilename` was given.
/// Exists so tests can substitute in-memory streams for stdin/stdout.
pub struct Io<R, W> {
    pub stdin: R,
    pub stdout: W,
}

/// Run one request/response exchange against the server at
/// `127.0.0.1:{config.port}` and return the bytes to report to the
/// operator on an `op=3` response, if any.
pub async fn run<R, W>(config: &ClientConfig, io: &mut Io<R, W>) -> Result<(), ClientError>
where
    R: AsyncReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let image = read_primary_image(config, &mut io.stdin).await?;
    let request = match &config.replace_file {
        Some(path) => {
            let replacement = read_file(path).await?;
            Frame::Replace { image, replacement }
        },
        None => Frame::Detect { image },
    };

    let mut stream = TcpStream::connect(("127.0.0.1", config.port))
        .await
        .map_err(ClientError::ServerUnreachable)?;

    request.encode(&mut stream).await.map_err(|err| ClientError::CommunicationError(err.to_string()))?;

    let response = read_response(&mut stream)
        .await
        .map_err(|err| ClientError::CommunicationError(err.to_string()))?;

    match response {
        Frame::ImageResult { jpeg } => write_output(config, &mut io.stdout, &jpeg).await,
        Frame::Error { message } => Err(ClientError::ServerErrorResponse(message)),
        Frame::Detect { .. } | Frame::Replace { .. } => {
            Err(ClientError::CommunicationError("unexpected request-shaped response".to_owned()))
        },
    }
}

async fn read_primary_image<R>(config: &ClientConfig, stdin: &mut R) -> Result<Vec<u8>, ClientError>
where
    R: AsyncReadExt + Unpin,
{
    match &config.detect_file {
        Some(path) => read_file(path).await,
        None => {
            let mut buf = Vec::new();
            stdin.read_to_end(&mut buf).await.map_err(ClientError::InputUnreadable)?;
            Ok(buf)
        },
    }
}

async fn read_file(path: &std::path::Path) -> Result<Vec<u8>, ClientError> {
    tokio::fs::read(path).await.map_err(ClientError::InputUnreadable)
}

async fn write_output<W>(config: &ClientConfig, stdout: &mut W, jpeg: &[u8]) -> Result<(), ClientError>
where
    W: AsyncWriteExt + Unpin,
{
    match &config.output_file {
        Some(path) => {
            tokio::fs::write(path, jpeg).await.map_err(ClientError::OutputUnwritable)?;
        },
        None => {
            stdout.write_all(jpeg).await.map_err(ClientError::OutputUnwritable)?;
            stdout.flush().await.map_err(ClientError::OutputUnwritable)?;
        },
    }
    Ok(())
}

/// Render the exact diagnostic-stream wrapper text for a server-side
/// error response (section 4.7).
#[must_use]
pub fn format_server_error_message(message: &str) -> String {
    format!("uqfaceclient: received the following error message: \"{message}\"\n")
}
