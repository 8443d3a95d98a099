use std::io::{self, BufRead, BufReader, Read};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use logtap_types::DEFAULT_UNIT;

use crate::{FetchError, LogSource};

/// Program invoked to read the journal
pub const DEFAULT_JOURNAL_COMMAND: &str = "journalctl";

/// Bounded wait for the journal command before it is killed
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads a unit's journal by running `journalctl`.
///
/// Every failure is reported as a [`FetchError`]; deciding whether to fall
/// back is left to the caller.
#[derive(Clone, Debug)]
pub struct JournalSource {
    /// Program to run (normally `journalctl`)
    program: String,

    /// Service unit to read
    unit: String,

    /// How long the command may run
    timeout: Duration,
}

impl JournalSource {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            program: DEFAULT_JOURNAL_COMMAND.to_string(),
            unit: unit.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Run a different program with the same arguments
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Arguments for "last N lines of the unit, unpaged, no hostname"
    pub fn args(&self, max_lines: usize) -> Vec<String> {
        vec![
            "-u".to_string(),
            self.unit.clone(),
            "-n".to_string(),
            max_lines.to_string(),
            "--no-pager".to_string(),
            "--no-hostname".to_string(),
        ]
    }

    /// Run the command and collect its combined output.
    ///
    /// stdout and stderr share one pipe, so lines keep the order the
    /// command wrote them in. Bytes that are not UTF-8 are replaced rather
    /// than failing the read. On any failure the partial output is dropped
    /// with the error.
    pub async fn read(&self, max_lines: usize) -> Result<Vec<String>, FetchError> {
        let (reader, writer) = io::pipe()?;

        // The temporary Command owns the parent's copies of the write end and
        // is dropped with this statement, so the reader sees EOF once the
        // child exits.
        let mut child = Command::new(&self.program)
            .args(self.args(max_lines))
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FetchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let collect = tokio::task::spawn_blocking(move || read_lines_lossy(reader));

        let outcome = tokio::time::timeout(self.timeout, async {
            let status = child.wait().await?;
            let lines = collect
                .await
                .map_err(|err| FetchError::Internal(format!("output reader failed: {err}")))??;
            Ok::<_, FetchError>((lines, status))
        })
        .await;

        let (mut lines, status) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                // kill_on_drop would reap it too, but do not leave it running
                let _ = child.start_kill();
                return Err(FetchError::Timeout(self.timeout));
            }
        };

        if !status.success() {
            debug!(
                program = %self.program,
                %status,
                discarded = lines.len(),
                "journal command exited unsuccessfully"
            );
            return Err(FetchError::Exit { status });
        }

        // Keep the most recent lines if the command returned extra
        if lines.len() > max_lines {
            let excess = lines.len() - max_lines;
            lines.drain(..excess);
        }

        Ok(lines)
    }
}

impl Default for JournalSource {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT)
    }
}

impl LogSource for JournalSource {
    async fn fetch(&self, max_lines: usize) -> Result<Vec<String>, FetchError> {
        self.read(max_lines).await
    }
}

/// Split raw output on `\n`, decoding each line lossily
fn read_lines_lossy(reader: impl Read) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        lines.push(String::from_utf8_lossy(line).into_owned());
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::testing::script;

    #[test]
    fn test_journalctl_arguments() {
        let source = JournalSource::default();
        assert_eq!(
            source.args(50),
            vec!["-u", "cost-web-app", "-n", "50", "--no-pager", "--no-hostname"]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let source = JournalSource::default().with_program("/nonexistent/logtap-journalctl");
        let err = source.read(10).await.unwrap_err();
        assert!(matches!(err, FetchError::Spawn { .. }));
        assert!(err.falls_back());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let source = JournalSource::default().with_program("false");
        let err = source.read(10).await.unwrap_err();
        assert!(matches!(err, FetchError::Exit { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_command_output() {
        // echo prints the journalctl arguments back as a single line
        let source = JournalSource::new("billing").with_program("echo");
        let lines = source.read(10).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("billing"));
        assert!(lines[0].contains("--no-hostname"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_bounded_to_max_lines() {
        let source = JournalSource::new("billing").with_program("echo");
        let lines = source.read(0).await.unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_lossy_lines_split_and_trim() {
        let raw: &[u8] = b"one\r\ntwo\n\xff\xfe three\nlast";
        let lines = read_lines_lossy(raw).unwrap();
        assert_eq!(lines, vec!["one", "two", "\u{FFFD}\u{FFFD} three", "last"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_journal() {
        let program = script(
            "invalid-utf8",
            "echo 'good one'\nprintf 'bad \\377\\376 bytes\\n'\necho 'good two'",
        );
        let lines = JournalSource::default().with_program(program).read(10).await.unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "good one");
        assert!(lines[1].starts_with("bad "));
        assert!(lines[1].contains('\u{FFFD}'));
        assert_eq!(lines[2], "good two");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_is_merged_in_write_order() {
        let program = script("merged", "echo out1\necho err1 1>&2\necho out2");
        let lines = JournalSource::default().with_program(program).read(10).await.unwrap();
        assert_eq!(lines, vec!["out1", "err1", "out2"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keeps_most_recent_lines() {
        let program = script("tail", "for n in 1 2 3 4 5; do echo l$n; done");
        let lines = JournalSource::default().with_program(program).read(2).await.unwrap();
        assert_eq!(lines, vec!["l4", "l5"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let program = script("slow", "exec sleep 5");
        let source = JournalSource::default()
            .with_program(program)
            .with_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = source.read(10).await.unwrap_err();

        assert!(matches!(err, FetchError::Timeout(t) if t == Duration::from_millis(200)));
        assert!(err.falls_back());
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
