use std::io::{self, Write};
use std::sync::Arc;

use crate::console::context::Scope;

/// A single mutable status line
#[derive(Debug, Clone)]
pub struct Status {
    scope: Arc<Scope>,
    verbose: bool,
}

impl Status {
    pub(crate) fn new(scope: Arc<Scope>, verbose: bool) -> Self {
        Self { scope, verbose }
    }

    /// Replace the status line
    pub fn report(&self, message: impl Into<String>) {
        self.scope.set_value(message.into());
    }

    /// Current status line
    pub fn value(&self) -> String {
        self.scope.value()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Append log lines beneath the status line. Ignored unless verbose.
    pub fn log(&self, message: impl AsRef<str>) {
        if !self.verbose {
            return;
        }
        for line in message.as_ref().lines() {
            self.scope.push_line(line.to_string());
        }
    }

    /// Writer that appends every complete line beneath the status line
    pub fn writer(&self) -> StatusWriter {
        StatusWriter {
            scope: Arc::clone(&self.scope),
            buf: Vec::new(),
        }
    }
}

/// [`io::Write`] adapter over a status scope's log lines
#[derive(Debug)]
pub struct StatusWriter {
    scope: Arc<Scope>,
    buf: Vec<u8>,
}

impl StatusWriter {
    fn push_complete_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            self.scope.push_line(text.trim_end_matches('\r').to_string());
        }
    }
}

impl Write for StatusWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.push_complete_lines();
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let text = String::from_utf8_lossy(&self.buf).to_string();
            self.buf.clear();
            self.scope.push_line(text);
        }
        Ok(())
    }
}

impl Drop for StatusWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
