//! PTY-backed transport

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::thread::JoinHandle;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::cleanup::{self, CleanupToken};
use super::transport::{ReadOutcome, Transport};
use crate::result::ExpectError;

/// Size of each chunk pulled off the PTY master.
const READ_CHUNK: usize = 4096;

/// A child process attached to a pseudo-terminal.
///
/// A reader thread pumps the PTY master into a channel; [`Transport::read`]
/// waits on that channel with a deadline on a private current-thread
/// runtime, so callers stay synchronous.
pub struct PtyTransport {
    label: String,
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    rx: UnboundedReceiver<Vec<u8>>,
    runtime: Runtime,
    reader: Option<JoinHandle<()>>,
    token: Option<CleanupToken>,
    eof: bool,
}

impl PtyTransport {
    /// Spawn `program` with `args` on a fresh PTY.
    pub fn spawn(
        label: &str,
        program: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        size: PtySize,
    ) -> Result<Self, ExpectError> {
        let pair = native_pty_system()
            .openpty(size)
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ExpectError::SpawnError(format!("{program}: {e}")))?;
        // The child holds its own copy; ours would keep the master from seeing EOF.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let (tx, rx) = unbounded_channel();
        let reader = std::thread::Builder::new()
            .name(format!("pty-{label}"))
            .spawn(move || pump(reader, tx))?;

        let token = cleanup::register(label, child.clone_killer());
        tracing::debug!(session = %label, program, ?args, pid = ?child.process_id(), "spawned");

        Ok(Self {
            label: label.to_string(),
            master: Some(pair.master),
            writer: Some(writer),
            child,
            rx,
            runtime,
            reader: Some(reader),
            token: Some(token),
            eof: false,
        })
    }

    /// Process id of the child, when the platform reports one.
    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    fn shutdown(&mut self, force: bool) -> Result<(), ExpectError> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        cleanup::unregister(token);

        // Dropping the writer hangs up politely before the kill.
        self.writer.take();
        if force || self.child.try_wait().ok().flatten().is_none() {
            if let Err(e) = self.child.kill() {
                tracing::debug!(session = %self.label, error = %e, "kill failed");
            }
        }
        let status = self.child.try_wait();
        tracing::debug!(session = %self.label, ?status, "closed");

        self.master.take();
        // The reader thread ends once the master is gone; don't wait on it.
        self.reader.take();
        Ok(())
    }
}

fn pump(mut reader: Box<dyn Read + Send>, tx: UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the slave side has no more holders.
            Err(_) => break,
        }
    }
}

impl Transport for PtyTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ExpectError::Closed(self.label.clone()))?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn read(&mut self, wait: Duration) -> Result<ReadOutcome, ExpectError> {
        if self.eof {
            return Ok(ReadOutcome::Closed);
        }
        if let Ok(chunk) = self.rx.try_recv() {
            return Ok(ReadOutcome::Data(chunk));
        }
        let outcome = self
            .runtime
            .block_on(async { tokio::time::timeout(wait, self.rx.recv()).await });
        Ok(match outcome {
            Ok(Some(chunk)) => ReadOutcome::Data(chunk),
            Ok(None) => {
                self.eof = true;
                ReadOutcome::Closed
            }
            Err(_) => ReadOutcome::Idle,
        })
    }

    fn is_alive(&mut self) -> bool {
        self.token.is_some() && matches!(self.child.try_wait(), Ok(None))
    }

    fn close(&mut self) -> Result<(), ExpectError> {
        self.shutdown(false)
    }

    fn kill(&mut self) -> Result<(), ExpectError> {
        self.shutdown(true)
    }
}

impl Drop for PtyTransport {
    fn drop(&mut self) {
        let _ = self.shutdown(true);
    }
}
