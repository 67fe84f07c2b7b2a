//! Background line reader.
//!
//! Each piped stream (server stdout, server stderr, operator stdin) gets its
//! own task that blocks on reads and pushes complete lines onto an unbounded
//! queue. The dispatch loop only ever pops from the queue, so a slow or idle
//! stream never stalls it.

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct LineReader {
    label: &'static str,
    rx: mpsc::UnboundedReceiver<String>,
    finished: Arc<AtomicBool>,
}

impl LineReader {
    /// Start draining `stream` on a new task. Lines keep their trailing
    /// newline; invalid UTF-8 is replaced rather than dropped.
    pub fn spawn<R>(label: &'static str, stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("{} reader stopped: {}", label, e);
                        break;
                    }
                }
            }
            // Every line is queued before the flag flips.
            done.store(true, Ordering::Release);
            debug!("{} reader reached end of stream", label);
        });
        Self { label, rx, finished }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Pop the next queued line without waiting.
    pub fn try_next(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Pop every line queued right now.
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.try_next() {
            lines.push(line);
        }
        lines
    }

    /// True once the read task has ended AND nothing is left in the queue.
    pub fn is_exhausted(&self) -> bool {
        self.finished.load(Ordering::Acquire) && self.rx.is_empty()
    }
}
