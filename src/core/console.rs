//! Output sinks for command handlers.
//!
//! Handlers never touch `std::io::stdout()` directly. The standard sink carries
//! result envelopes only; everything operator-facing goes to the error sink so
//! machine-readable output stays parseable.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

#[derive(Clone)]
enum Sink {
    Stdout,
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

impl Sink {
    fn write_line(&self, line: &str) -> Result<()> {
        match self {
            Sink::Stdout => write_std(io::stdout().lock(), line, "write stdout"),
            Sink::Stderr => write_std(io::stderr().lock(), line, "write stderr"),
            Sink::Buffer(buf) => {
                let mut guard = buf
                    .lock()
                    .map_err(|_| Error::internal_unexpected("console buffer poisoned"))?;
                guard.extend_from_slice(line.as_bytes());
                guard.push(b'\n');
                Ok(())
            }
        }
    }

    fn contents(&self) -> String {
        match self {
            Sink::Buffer(buf) => buf
                .lock()
                .map(|b| String::from_utf8_lossy(&b).to_string())
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

fn write_std(mut handle: impl Write, line: &str, context: &str) -> Result<()> {
    if let Err(e) = writeln!(handle, "{}", line) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(e.to_string(), Some(context.to_string())));
    }
    Ok(())
}

/// A pair of line-oriented sinks: standard output and diagnostics.
#[derive(Clone)]
pub struct Console {
    out: Sink,
    err: Sink,
}

impl Console {
    /// Process stdout/stderr.
    pub fn std() -> Self {
        Self {
            out: Sink::Stdout,
            err: Sink::Stderr,
        }
    }

    /// Both streams captured in memory.
    pub fn captured() -> Self {
        Self {
            out: Sink::Buffer(Arc::new(Mutex::new(Vec::new()))),
            err: Sink::Buffer(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Capture stdout but keep diagnostics on this console's error sink.
    pub fn capture_out(&self) -> Self {
        Self {
            out: Sink::Buffer(Arc::new(Mutex::new(Vec::new()))),
            err: self.err.clone(),
        }
    }

    pub fn out_line(&self, line: &str) -> Result<()> {
        self.out.write_line(line)
    }

    pub fn err_line(&self, line: &str) -> Result<()> {
        self.err.write_line(line)
    }

    /// Captured standard output; empty for process streams.
    pub fn out_text(&self) -> String {
        self.out.contents()
    }

    /// Captured diagnostics; empty for process streams.
    pub fn err_text(&self) -> String {
        self.err.contents()
    }
}

#[cfg(test)]
impl Console {
    /// Same stdout, but every diagnostic write fails.
    pub(crate) fn with_broken_err(&self) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let poison = Arc::clone(&buf);
        let _ = std::thread::spawn(move || {
            let _guard = poison.lock();
            panic!("poison console buffer");
        })
        .join();
        Self {
            out: self.out.clone(),
            err: Sink::Buffer(buf),
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_console_separates_streams() {
        let console = Console::captured();
        console.out_line("{\"status\":\"success\"}").unwrap();
        console.err_line("WARNING: something").unwrap();

        assert_eq!(console.out_text(), "{\"status\":\"success\"}\n");
        assert_eq!(console.err_text(), "WARNING: something\n");
    }

    #[test]
    fn broken_error_sink_reports_failure() {
        let console = Console::captured().with_broken_err();
        assert!(console.err_line("lost").is_err());
        console.out_line("kept").unwrap();
        assert_eq!(console.out_text(), "kept\n");
    }

    #[test]
    fn capture_out_shares_error_sink() {
        let parent = Console::captured();
        let child = parent.capture_out();
        child.out_line("child data").unwrap();
        child.err_line("child warning").unwrap();

        assert_eq!(parent.out_text(), "");
        assert_eq!(child.out_text(), "child data\n");
        assert_eq!(parent.err_text(), "child warning\n");
    }
}
