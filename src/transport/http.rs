use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::info;

use crate::errors::TraceError;
use crate::source::ArchiveFetcher;
use crate::transport::fs::write_atomically;

/// Streams archives over HTTP(S) with `ureq`.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    /// Minimum interval between progress log lines.
    pub report_every: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            report_every: Duration::from_secs(2),
        }
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str, target: &Path) -> Result<(), TraceError> {
        let download_error = |reason: String| TraceError::Download {
            url: url.to_string(),
            reason,
        };
        let response = ureq::get(url)
            .call()
            .map_err(|err| download_error(err.to_string()))?;
        let mut reader = response.into_body().into_reader();

        info!(
            "[nettraces:http] downloading {} -> {}",
            url,
            target.display()
        );
        let started = Instant::now();
        let mut total_bytes = 0u64;
        write_atomically(target, |file| {
            let mut buffer = vec![0u8; 1024 * 1024];
            let mut last_report = Instant::now();
            loop {
                let read = reader
                    .read(&mut buffer)
                    .map_err(|err| download_error(format!("failed reading body: {err}")))?;
                if read == 0 {
                    break;
                }
                file.write_all(&buffer[..read])?;
                total_bytes = total_bytes.saturating_add(read as u64);
                if last_report.elapsed() >= self.report_every {
                    info!(
                        "[nettraces:http] download progress {}: {:.1} MiB ({:.1}s)",
                        target.display(),
                        total_bytes as f64 / (1024.0 * 1024.0),
                        started.elapsed().as_secs_f64()
                    );
                    last_report = Instant::now();
                }
            }
            Ok(())
        })?;
        info!(
            "[nettraces:http] download complete {}: {:.1} MiB in {:.1}s",
            target.display(),
            total_bytes as f64 / (1024.0 * 1024.0),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
