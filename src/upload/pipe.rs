// Bounded in-memory byte pipe.
//
// The writer half collects bytes into chunks of `CHUNK_SIZE` and hands full
// chunks to a `sync_channel` of fixed capacity, so `write` blocks while the
// reader lags behind. At most `capacity + 2` chunks are alive at any time:
// the queued ones, the one the writer is filling and the one the reader is
// draining.
//
// A body is only complete when the writer calls `close`. If the writer is
// dropped or aborted first, the reader fails instead of reporting EOF, so a
// truncated stream can never look like a finished one.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

pub const CHUNK_SIZE: usize = 32 * 1024;
pub const DEFAULT_CAPACITY: usize = 4;

enum Message {
    Data(Vec<u8>),
    Abort(io::Error),
}

#[derive(Default)]
struct Shared {
    buffered: AtomicUsize,
    peak: AtomicUsize,
    closed: AtomicBool,
}

impl Shared {
    fn add(&self, n: usize) {
        let now = self.buffered.fetch_add(n, Ordering::SeqCst) + n;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn sub(&self, n: usize) {
        self.buffered.fetch_sub(n, Ordering::SeqCst);
    }
}

/// Read-only view of how many bytes sit inside a pipe.
#[derive(Clone)]
pub struct PipeStats(Arc<Shared>);

impl PipeStats {
    /// Bytes written but not yet read.
    pub fn buffered(&self) -> usize {
        self.0.buffered.load(Ordering::SeqCst)
    }

    /// High-water mark of `buffered` over the pipe's lifetime.
    pub fn peak(&self) -> usize {
        self.0.peak.load(Ordering::SeqCst)
    }
}

/// Upper bound on `PipeStats::peak` for a pipe of the given capacity.
pub fn max_buffered(capacity: usize) -> usize {
    (capacity.max(1) + 2) * CHUNK_SIZE
}

/// Create a pipe holding at most `capacity` queued chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = sync_channel(capacity.max(1));
    let shared = Arc::new(Shared::default());
    let writer = PipeWriter {
        tx: Some(tx),
        buf: Vec::with_capacity(CHUNK_SIZE),
        shared: shared.clone(),
    };
    let reader = PipeReader {
        rx,
        current: Vec::new(),
        pos: 0,
        shared,
        state: ReadState::Open,
    };
    (writer, reader)
}

pub struct PipeWriter {
    tx: Option<SyncSender<Message>>,
    buf: Vec<u8>,
    shared: Arc<Shared>,
}

impl PipeWriter {
    pub fn stats(&self) -> PipeStats {
        PipeStats(self.shared.clone())
    }

    /// Flush what is left and mark the stream as complete.
    pub fn close(mut self) -> io::Result<()> {
        self.send_chunk()?;
        self.shared.closed.store(true, Ordering::SeqCst);
        self.tx.take();
        Ok(())
    }

    /// Discard pending bytes and make the reader fail with `err`.
    pub fn abort(mut self, err: io::Error) {
        self.shared.sub(self.buf.len());
        self.buf.clear();
        if let Some(tx) = self.tx.take() {
            // The reader may already be gone; nothing left to tell then.
            let _ = tx.send(Message::Abort(err));
        }
    }

    fn send_chunk(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        let len = chunk.len();
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe already closed"))?;
        tx.send(Message::Data(chunk)).map_err(|_| {
            self.shared.sub(len);
            io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader went away")
        })
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let n = (CHUNK_SIZE - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..n]);
        self.shared.add(n);
        if self.buf.len() == CHUNK_SIZE {
            self.send_chunk()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_chunk()
    }
}

#[derive(PartialEq)]
enum ReadState {
    Open,
    Finished,
    Failed,
}

pub struct PipeReader {
    rx: Receiver<Message>,
    current: Vec<u8>,
    pos: usize,
    shared: Arc<Shared>,
    state: ReadState,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.current.len() {
                let n = (self.current.len() - self.pos).min(out.len());
                out[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                self.shared.sub(n);
                return Ok(n);
            }
            match self.state {
                ReadState::Finished => return Ok(0),
                ReadState::Failed => {
                    return Err(io::Error::new(io::ErrorKind::Other, "upload stream aborted"))
                }
                ReadState::Open => {}
            }
            match self.rx.recv() {
                Ok(Message::Data(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Message::Abort(err)) => {
                    self.state = ReadState::Failed;
                    return Err(err);
                }
                Err(_) if self.shared.closed.load(Ordering::SeqCst) => {
                    self.state = ReadState::Finished;
                }
                Err(_) => {
                    self.state = ReadState::Failed;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upload producer stopped before the body was complete",
                    ));
                }
            }
        }
    }
}
