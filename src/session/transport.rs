//! The byte channel under a session

use std::time::Duration;

use crate::result::ExpectError;

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// New output
    Data(Vec<u8>),
    /// Nothing arrived within the wait
    Idle,
    /// The remote end closed; no more output will arrive
    Closed,
}

/// A bidirectional byte channel to a console.
///
/// Implemented by [`PtyTransport`](super::PtyTransport) for real child
/// processes and by [`ScriptedTransport`](super::ScriptedTransport) for
/// tests. Reads never block past the given wait.
pub trait Transport {
    /// Write all of `data` to the target.
    fn write(&mut self, data: &[u8]) -> Result<(), ExpectError>;

    /// Wait at most `wait` for output.
    fn read(&mut self, wait: Duration) -> Result<ReadOutcome, ExpectError>;

    /// Whether the far end is still running.
    fn is_alive(&mut self) -> bool;

    /// Shut the channel down. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), ExpectError>;

    /// Forcefully terminate the far end.
    fn kill(&mut self) -> Result<(), ExpectError> {
        self.close()
    }
}
