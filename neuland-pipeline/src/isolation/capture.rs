// Output Capture
// Pumps an engine process's stdout and stderr into its per-task log file

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

/// Number of stderr lines kept for failure reports
const TAIL_LINES: usize = 20;

/// How long to wait for the pipes to drain once the process has ended
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Callback for handling output lines in real-time (line, is_stderr)
pub type LineCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// What the pumps saw while the process ran
#[derive(Debug, Clone, Default)]
pub struct CaptureReport {
    /// Bytes written to the log, header and footer excluded
    pub bytes: u64,
    pub stderr_tail: Vec<String>,
}

struct PumpResult {
    bytes: u64,
    tail: VecDeque<String>,
}

/// Scoped redirection of one engine run into a log file
///
/// The engine writes below this crate's own I/O, so its descriptors are
/// bound to pipes at spawn time and drained here; the orchestrator's own
/// stdout and stderr are never touched. Dropping the capture aborts any
/// pump that is still running.
pub struct OutputCapture {
    path: PathBuf,
    pumps: Vec<JoinHandle<PumpResult>>,
    on_line: Option<LineCallback>,
}

impl OutputCapture {
    /// Truncate (or create) the log and write `header`
    pub async fn create(path: &Path, header: &str) -> io::Result<Self> {
        let mut file = File::create(path).await?;
        file.write_all(header.as_bytes()).await?;
        file.flush().await?;

        Ok(Self {
            path: path.to_path_buf(),
            pumps: Vec::new(),
            on_line: None,
        })
    }

    /// Forward every captured line to `callback` as well
    pub fn with_line_callback(mut self, callback: LineCallback) -> Self {
        self.on_line = Some(callback);
        self
    }

    /// Start draining `stream` into the log
    pub async fn attach<R>(&mut self, stream: R, is_stderr: bool) -> io::Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log = self.append_handle().await?;
        let on_line = self.on_line.clone();
        self.pumps
            .push(tokio::spawn(pump(stream, log, is_stderr, on_line)));
        Ok(())
    }

    /// Wait for the pumps to drain and append `footer`
    ///
    /// All pumps share one drain deadline of [`DRAIN_GRACE`].
    pub async fn finish(mut self, footer: &str) -> CaptureReport {
        let mut report = CaptureReport::default();
        let mut tail = VecDeque::new();
        let deadline = tokio::time::Instant::now() + DRAIN_GRACE;

        for mut handle in std::mem::take(&mut self.pumps) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(result)) => {
                    report.bytes += result.bytes;
                    tail.extend(result.tail);
                }
                Ok(Err(e)) => {
                    tracing::warn!(log = %self.path.display(), "output pump failed: {}", e);
                }
                Err(_) => {
                    // A forked helper still holds the pipe open
                    tracing::warn!(log = %self.path.display(), "output pipe did not close, abandoning it");
                    handle.abort();
                }
            }
        }

        report.stderr_tail = tail.into_iter().collect();

        match self.append_handle().await {
            Ok(mut log) => {
                let line = format!("\n# {}\n", footer);
                if let Err(e) = log.write_all(line.as_bytes()).await {
                    tracing::warn!(log = %self.path.display(), "cannot write log footer: {}", e);
                }
                let _ = log.flush().await;
            }
            Err(e) => {
                tracing::warn!(log = %self.path.display(), "cannot reopen log: {}", e);
            }
        }

        report
    }

    async fn append_handle(&self) -> io::Result<File> {
        OpenOptions::new().append(true).open(&self.path).await
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        for handle in &self.pumps {
            handle.abort();
        }
    }
}

/// Copy a stream into the log line by line; non-UTF-8 bytes are kept verbatim
async fn pump<R>(
    stream: R,
    mut log: File,
    is_stderr: bool,
    on_line: Option<LineCallback>,
) -> PumpResult
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut tail = VecDeque::new();
    let mut bytes = 0u64;
    let mut log_ok = true;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                bytes += n as u64;
                // Keep draining even if the log is gone, or the engine blocks on a full pipe
                if log_ok {
                    if let Err(e) = log.write_all(&buf).await {
                        tracing::warn!("log write failed: {}", e);
                        log_ok = false;
                    }
                }

                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(|c| c == '\n' || c == '\r');
                if let Some(callback) = &on_line {
                    callback(line, is_stderr);
                }
                if is_stderr {
                    if tail.len() == TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                }
            }
            Err(e) => {
                tracing::warn!("output stream read failed: {}", e);
                break;
            }
        }
    }

    let _ = log.flush().await;
    PumpResult { bytes, tail }
}
