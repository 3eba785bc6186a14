//! Send/await diagnostics.
//!
//! When [`RunConfig::debug`](crate::RunConfig) is set, every send and every
//! await on a console is mirrored to a [`DiagnosticSink`]. Sinks only
//! observe; nothing they do feeds back into matching.

use std::cell::RefCell;
use std::io::Write;
use std::time::Duration;

use chrono::Local;

/// One observed console interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagEvent {
    /// Bytes written to the target
    Send {
        /// Device or session label
        device: String,
        /// Text sent, control bytes escaped
        text: String,
    },
    /// An await started
    Await {
        /// Device or session label
        device: String,
        /// Rendered pattern list
        patterns: Vec<String>,
        /// Deadline, if any
        timeout: Option<Duration>,
    },
    /// An await matched
    Matched {
        /// Device or session label
        device: String,
        /// Index into the pattern list
        index: usize,
        /// Matched text
        matched: String,
    },
    /// An await hit its deadline
    TimedOut {
        /// Device or session label
        device: String,
        /// Deadline that expired
        timeout: Duration,
    },
    /// The channel closed during an await
    EndOfStream {
        /// Device or session label
        device: String,
    },
}

impl std::fmt::Display for DiagEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagEvent::Send { device, text } => write!(f, "[{device}] send {text}"),
            DiagEvent::Await {
                device,
                patterns,
                timeout,
            } => write!(f, "[{device}] await [{}] timeout={timeout:?}", patterns.join(", ")),
            DiagEvent::Matched {
                device,
                index,
                matched,
            } => write!(f, "[{device}] matched #{index} {matched:?}"),
            DiagEvent::TimedOut { device, timeout } => {
                write!(f, "[{device}] timeout after {timeout:?}")
            }
            DiagEvent::EndOfStream { device } => write!(f, "[{device}] end of stream"),
        }
    }
}

/// Receiver of console diagnostics.
pub trait DiagnosticSink {
    /// Record one event.
    fn record(&self, event: &DiagEvent);
}

/// Sink that emits `tracing` debug events under `consolebench::diag`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: &DiagEvent) {
        tracing::debug!(target: "consolebench::diag", "{}", event);
    }
}

/// Sink that appends timestamped lines to any writer, e.g. a per-device
/// console log file.
pub struct WriterSink<W: Write> {
    writer: RefCell<W>,
}

impl<W: Write> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: RefCell::new(writer),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write> DiagnosticSink for WriterSink<W> {
    fn record(&self, event: &DiagEvent) {
        let Ok(mut w) = self.writer.try_borrow_mut() else {
            return;
        };
        // Best effort.
        let _ = writeln!(w, "{} {}", Local::now().format("%H:%M:%S%.3f"), event);
        let _ = w.flush();
    }
}

/// Escape control bytes so sent text reads on one line.
pub(crate) fn escape_control(text: &str) -> String {
    text.chars().flat_map(char::escape_default).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_sink_lines() {
        let sink = WriterSink::new(Vec::new());
        sink.record(&DiagEvent::Send {
            device: "cm".into(),
            text: escape_control("reboot\r\n"),
        });
        sink.record(&DiagEvent::Matched {
            device: "cm".into(),
            index: 1,
            matched: "login:".into(),
        });
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[cm] send reboot\\r\\n"));
        assert!(lines[1].ends_with("[cm] matched #1 \"login:\""));
    }
}
