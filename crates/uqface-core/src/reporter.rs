//! The `SIGHUP`-driven statistics reporter (section 4.6).
//!
//! One dedicated task per server process. Every other task in the process
//! simply never observes `SIGHUP` since nothing else awaits the signal
//! stream — there is no explicit masking to perform, tokio's
//! `signal::unix::signal` already restricts delivery to whoever holds the
//! stream.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, Stderr};
use tokio::signal::unix::{signal, SignalKind};

use crate::stats::Stats;

/// Run the reporter loop forever, writing a snapshot report to `stderr`
/// each time `SIGHUP` is delivered to this process.
///
/// Returns only if installing the signal handler fails, which is treated
/// as fatal by the caller (this mirrors preflight failures elsewhere: a
/// server that cannot observe its own operator signal should not start).
pub async fn run(stats: Arc<Stats>) -> std::io::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut stderr = tokio::io::stderr();

    loop {
        if hangup.recv().await.is_none() {
            return Ok(());
        }
        report_once(&stats, &mut stderr).await?;
    }
}

async fn report_once(stats: &Stats, stderr: &mut Stderr) -> std::io::Result<()> {
    let report = stats.snapshot().report_lines();
    stderr.write_all(report.as_bytes()).await?;
    stderr.flush().await
}

#[cfg(test)]
mod tests {
    use super::report_once;
    use crate::stats::Stats;

    #[tokio::test]
    async fn report_once_writes_current_snapshot() {
        let stats = Stats::new();
        stats.client_connected();
        stats.face_detect_ok();

        let mut stderr = tokio::io::stderr();
        report_once(&stats, &mut stderr).await.expect("report");
    }
}
