//! Raw I/Q dump sink.
//!
//! The RF callback must never touch disk, so writes are handed to a worker
//! thread through a bounded channel. When the channel is full the chunk is
//! dropped; a gap in a diagnostic dump beats a glitch in the live stream.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Sender};

use crate::input::error::InputResult;

const DUMP_QUEUE_CHUNKS: usize = 64;

enum DumpMsg {
    Open(File),
    Write(Vec<u8>),
    Close,
    Shutdown,
}

struct DumpShared {
    active: AtomicBool,
    bytes: AtomicU64,
}

/// Owner handle living on the control thread.
pub struct RawRecorder {
    tx: Sender<DumpMsg>,
    shared: Arc<DumpShared>,
    worker: Option<JoinHandle<()>>,
}

/// Cheap handle given to the sample pump.
#[derive(Clone)]
pub struct RecorderHandle {
    tx: Sender<DumpMsg>,
    shared: Arc<DumpShared>,
}

impl RawRecorder {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<DumpMsg>(DUMP_QUEUE_CHUNKS);
        let shared = Arc::new(DumpShared {
            active: AtomicBool::new(false),
            bytes: AtomicU64::new(0),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("iq-dump".into())
            .spawn(move || {
                let mut sink: Option<BufWriter<File>> = None;
                for msg in rx {
                    match msg {
                        DumpMsg::Open(file) => sink = Some(BufWriter::new(file)),
                        DumpMsg::Write(chunk) => {
                            if let Some(out) = sink.as_mut() {
                                match out.write_all(&chunk) {
                                    Ok(()) => {
                                        worker_shared
                                            .bytes
                                            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                                    }
                                    Err(e) => {
                                        log::error!("raw dump write failed: {e}");
                                        worker_shared.active.store(false, Ordering::Relaxed);
                                        sink = None;
                                    }
                                }
                            }
                        }
                        DumpMsg::Close => {
                            if let Some(mut out) = sink.take() {
                                if let Err(e) = out.flush() {
                                    log::error!("raw dump flush failed: {e}");
                                }
                            }
                        }
                        DumpMsg::Shutdown => break,
                    }
                }
            })
            .ok();
        Self { tx, shared, worker }
    }

    /// Creates the dump file and starts mirroring the filtered stream.
    pub fn open(&self, path: &Path) -> InputResult<()> {
        let file = File::create(path)?;
        let _ = self.tx.send(DumpMsg::Open(file));
        self.shared.bytes.store(0, Ordering::Relaxed);
        self.shared.active.store(true, Ordering::Relaxed);
        log::info!("dumping raw IQ to {}", path.display());
        Ok(())
    }

    pub fn close(&self) {
        self.shared.active.store(false, Ordering::Relaxed);
        let _ = self.tx.send(DumpMsg::Close);
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Relaxed)
    }

    /// Cumulative bytes flushed to the file so far.
    pub fn dumped_bytes(&self) -> u64 {
        self.shared.bytes.load(Ordering::Relaxed)
    }

    pub fn handle(&self) -> RecorderHandle {
        RecorderHandle {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for RawRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RawRecorder {
    fn drop(&mut self) {
        let _ = self.tx.send(DumpMsg::Close);
        let _ = self.tx.send(DumpMsg::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl RecorderHandle {
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Relaxed)
    }

    /// Queues one chunk for the worker. Drops it when the queue is full.
    pub fn write(&self, bytes: &[u8]) {
        if self.tx.try_send(DumpMsg::Write(bytes.to_vec())).is_err() {
            log::debug!("raw dump queue full, dropping {} bytes", bytes.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for_bytes(rec: &RawRecorder, expect: u64) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while rec.dumped_bytes() < expect {
            assert!(Instant::now() < deadline, "dump worker never caught up");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_dump_accounts_bytes_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.raw");
        let rec = RawRecorder::new();
        rec.open(&path).unwrap();
        let handle = rec.handle();
        assert!(handle.is_active());
        handle.write(&[1u8, 2, 3, 4]);
        handle.write(&[5u8, 6]);
        wait_for_bytes(&rec, 6);
        rec.close();
        assert!(!handle.is_active());
        // Close flushes; give the worker a moment to process it.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_writes_before_open_are_ignored() {
        let rec = RawRecorder::new();
        let handle = rec.handle();
        assert!(!handle.is_active());
        handle.write(&[0u8; 16]);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(rec.dumped_bytes(), 0);
    }
}
