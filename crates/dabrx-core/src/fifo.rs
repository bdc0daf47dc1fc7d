//! Byte ring buffer connecting a real-time producer to a consumer thread.
//!
//! Two of these carry the whole pipeline: decimated I/Q bytes from the RF
//! driver callback to the demodulator, and PCM bytes from the decoder to the
//! audio output callback. The occupancy count is the only cross-side
//! synchronization point; writes never block on the consumer (the producer
//! drops the chunk instead) and reads can wait on a condvar with a bounded
//! timeout.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Returned when a write would overflow the buffer. The whole chunk is
/// rejected; partial writes never happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sample fifo full: {requested} bytes requested, {free} bytes free")]
pub struct FifoOverflow {
    pub requested: usize,
    pub free: usize,
}

/// Fixed-capacity byte FIFO with drop-on-full writes.
///
/// Capacity is rounded up to a power of two so the head/tail arithmetic is a
/// mask. `occupancy` is guarded by a mutex and paired with a condvar that is
/// notified on every change. `head` lives in a producer-side mutex and
/// `tail` in a consumer-side one; each serializes storage access for its
/// side, and the occupancy protocol guarantees the two sides never touch the
/// same bytes (a writer only enters the free region, a reader only the
/// filled region).
pub struct SampleFifo {
    storage: Box<[UnsafeCell<u8>]>,
    mask: usize,
    occupancy: Mutex<usize>,
    changed: Condvar,
    head: Mutex<usize>,
    tail: Mutex<usize>,
    /// Bumped by `reset()` so a blocked `read` bails out instead of holding
    /// the tail lock for its whole timeout.
    epoch: AtomicU64,
}

// Storage access is serialized per side by `head`/`tail` mutexes and the
// regions are disjoint under the occupancy protocol.
unsafe impl Send for SampleFifo {}
unsafe impl Sync for SampleFifo {}

impl SampleFifo {
    /// Creates a FIFO holding at least `capacity` bytes (rounded up to the
    /// next power of two).
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(2).next_power_of_two();
        let storage = (0..cap).map(|_| UnsafeCell::new(0u8)).collect();
        Self {
            storage,
            mask: cap - 1,
            occupancy: Mutex::new(0),
            changed: Condvar::new(),
            head: Mutex::new(0),
            tail: Mutex::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        *lock(&self.occupancy)
    }

    /// Bytes of free space. Only the consumer grows this value, so a
    /// producer-side snapshot is a safe lower bound.
    pub fn free(&self) -> usize {
        self.capacity() - self.available()
    }

    fn base(&self) -> *mut u8 {
        self.storage.as_ptr() as *mut u8
    }

    /// Copies `data` into the ring starting at `pos`, wrapping at most once.
    /// Caller must hold the producer lock and have verified free space.
    unsafe fn copy_in(&self, pos: usize, data: &[u8]) {
        let first = data.len().min(self.capacity() - pos);
        ptr::copy_nonoverlapping(data.as_ptr(), self.base().add(pos), first);
        ptr::copy_nonoverlapping(data.as_ptr().add(first), self.base(), data.len() - first);
    }

    /// Copies `out.len()` bytes out of the ring starting at `pos`.
    /// Caller must hold the consumer lock and have verified occupancy.
    unsafe fn copy_out(&self, pos: usize, out: &mut [u8]) {
        let first = out.len().min(self.capacity() - pos);
        ptr::copy_nonoverlapping(self.base().add(pos), out.as_mut_ptr(), first);
        ptr::copy_nonoverlapping(self.base(), out.as_mut_ptr().add(first), out.len() - first);
    }

    /// Writes the whole chunk or nothing. Never blocks on the consumer.
    pub fn write(&self, data: &[u8]) -> Result<(), FifoOverflow> {
        if data.is_empty() {
            return Ok(());
        }
        let mut head = lock(&self.head);
        let free = self.free();
        if free < data.len() {
            return Err(FifoOverflow {
                requested: data.len(),
                free,
            });
        }
        unsafe { self.copy_in(*head, data) };
        *head = (*head + data.len()) & self.mask;
        let mut count = lock(&self.occupancy);
        *count += data.len();
        self.changed.notify_all();
        Ok(())
    }

    /// Blocking read of exactly `out.len()` bytes. Waits on the occupancy
    /// condvar up to `timeout`; returns `false` if the data never arrived
    /// (nothing is consumed in that case).
    pub fn read(&self, out: &mut [u8], timeout: Duration) -> bool {
        if out.is_empty() {
            return true;
        }
        if out.len() > self.capacity() {
            return false;
        }
        let mut tail = lock(&self.tail);
        let deadline = Instant::now() + timeout;
        let epoch = self.epoch.load(Ordering::Acquire);
        {
            let mut count = lock(&self.occupancy);
            while *count < out.len() {
                if self.epoch.load(Ordering::Acquire) != epoch {
                    return false;
                }
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                let (guard, _) = self
                    .changed
                    .wait_timeout(count, deadline - now)
                    .unwrap_or_else(|e| e.into_inner());
                count = guard;
            }
        }
        // Only this consumer can shrink the filled region, so the bytes
        // stay valid after dropping the occupancy lock.
        unsafe { self.copy_out(*tail, out) };
        *tail = (*tail + out.len()) & self.mask;
        let mut count = lock(&self.occupancy);
        *count -= out.len();
        self.changed.notify_all();
        true
    }

    /// Non-blocking exact read for the audio callback path. Returns `false`
    /// without consuming anything if fewer than `out.len()` bytes are
    /// buffered.
    pub fn pop(&self, out: &mut [u8]) -> bool {
        if out.is_empty() {
            return true;
        }
        let mut tail = lock(&self.tail);
        if self.available() < out.len() {
            return false;
        }
        unsafe { self.copy_out(*tail, out) };
        *tail = (*tail + out.len()) & self.mask;
        let mut count = lock(&self.occupancy);
        *count -= out.len();
        self.changed.notify_all();
        true
    }

    /// Advances the read position without copying (muted-drain path).
    /// Discards at most `len` bytes and returns how many were dropped.
    pub fn discard(&self, len: usize) -> usize {
        let mut tail = lock(&self.tail);
        let n = self.available().min(len);
        *tail = (*tail + n) & self.mask;
        let mut count = lock(&self.occupancy);
        *count -= n;
        self.changed.notify_all();
        n
    }

    /// Pads all free space with zero bytes through the write path. Used by
    /// the watchdog so a blocked consumer wakes up on something.
    pub fn fill_with_silence(&self) -> usize {
        let mut head = lock(&self.head);
        let n = self.free();
        if n == 0 {
            return 0;
        }
        unsafe {
            let first = n.min(self.capacity() - *head);
            ptr::write_bytes(self.base().add(*head), 0, first);
            ptr::write_bytes(self.base(), 0, n - first);
        }
        *head = (*head + n) & self.mask;
        let mut count = lock(&self.occupancy);
        *count += n;
        self.changed.notify_all();
        n
    }

    /// Empties the buffer. Takes both side locks, so it must only be called
    /// when the producer is known to be stopped or stalled. A reader blocked
    /// in `read` is woken and returns empty-handed.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        {
            // Notify under the count lock so a reader between its epoch
            // check and its wait cannot miss the wake-up.
            let _count = lock(&self.occupancy);
            self.changed.notify_all();
        }
        let mut head = lock(&self.head);
        let mut tail = lock(&self.tail);
        let mut count = lock(&self.occupancy);
        *head = 0;
        *tail = 0;
        *count = 0;
        self.changed.notify_all();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        assert_eq!(SampleFifo::new(1000).capacity(), 1024);
        assert_eq!(SampleFifo::new(1024).capacity(), 1024);
    }

    #[test]
    fn test_write_then_pop_preserves_bytes() {
        let fifo = SampleFifo::new(64);
        fifo.write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(fifo.available(), 4);
        let mut out = [0u8; 4];
        assert!(fifo.pop(&mut out));
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(fifo.available(), 0);
    }

    #[test]
    fn test_oversize_write_is_rejected_whole() {
        let fifo = SampleFifo::new(16);
        fifo.write(&[0u8; 10]).unwrap();
        let err = fifo.write(&[0u8; 10]).unwrap_err();
        assert_eq!(err.requested, 10);
        assert_eq!(err.free, 6);
        // Nothing was partially written.
        assert_eq!(fifo.available(), 10);
    }

    #[test]
    fn test_wraparound_copy() {
        let fifo = SampleFifo::new(8);
        fifo.write(&[0u8; 6]).unwrap();
        assert_eq!(fifo.discard(6), 6);
        // head and tail now sit at 6; this write wraps.
        fifo.write(&[10, 11, 12, 13]).unwrap();
        let mut out = [0u8; 4];
        assert!(fifo.pop(&mut out));
        assert_eq!(out, [10, 11, 12, 13]);
    }

    #[test]
    fn test_pop_refuses_short_buffer() {
        let fifo = SampleFifo::new(16);
        fifo.write(&[1, 2]).unwrap();
        let mut out = [0u8; 4];
        assert!(!fifo.pop(&mut out));
        assert_eq!(fifo.available(), 2);
    }

    #[test]
    fn test_read_times_out_without_consuming() {
        let fifo = SampleFifo::new(16);
        fifo.write(&[1, 2]).unwrap();
        let mut out = [0u8; 4];
        assert!(!fifo.read(&mut out, Duration::from_millis(10)));
        assert_eq!(fifo.available(), 2);
    }

    #[test]
    fn test_read_wakes_on_write() {
        let fifo = Arc::new(SampleFifo::new(64));
        let writer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                fifo.write(&[7u8; 8]).unwrap();
            })
        };
        let mut out = [0u8; 8];
        assert!(fifo.read(&mut out, Duration::from_secs(2)));
        assert_eq!(out, [7u8; 8]);
        writer.join().unwrap();
    }

    #[test]
    fn test_fill_with_silence_pads_free_space() {
        let fifo = SampleFifo::new(16);
        fifo.write(&[9u8; 4]).unwrap();
        assert_eq!(fifo.fill_with_silence(), 12);
        assert_eq!(fifo.available(), 16);
        let mut out = [1u8; 16];
        assert!(fifo.pop(&mut out));
        assert_eq!(&out[..4], &[9u8; 4]);
        assert_eq!(&out[4..], &[0u8; 12]);
    }

    #[test]
    fn test_reset_empties() {
        let fifo = SampleFifo::new(16);
        fifo.write(&[1u8; 8]).unwrap();
        fifo.reset();
        assert_eq!(fifo.available(), 0);
        assert_eq!(fifo.free(), 16);
    }

    #[test]
    fn test_reset_interrupts_blocked_read() {
        let fifo = Arc::new(SampleFifo::new(64));
        let reader = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || {
                let mut out = [0u8; 8];
                let start = Instant::now();
                let got = fifo.read(&mut out, Duration::from_secs(10));
                (got, start.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        fifo.reset();
        let (got, waited) = reader.join().unwrap();
        assert!(!got);
        assert!(waited < Duration::from_secs(5), "read sat out its timeout");
    }

    #[test]
    fn test_concurrent_stream_preserves_order() {
        let fifo = Arc::new(SampleFifo::new(256));
        let producer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || {
                let mut next = 0u8;
                let mut written = 0usize;
                while written < 4096 {
                    let chunk: Vec<u8> = (0..32).map(|i| next.wrapping_add(i)).collect();
                    if fifo.write(&chunk).is_ok() {
                        next = next.wrapping_add(32);
                        written += 32;
                    } else {
                        thread::yield_now();
                    }
                }
            })
        };
        let mut expected = 0u8;
        let mut consumed = 0usize;
        let mut buf = [0u8; 32];
        while consumed < 4096 {
            assert!(fifo.read(&mut buf, Duration::from_secs(5)));
            for b in buf {
                assert_eq!(b, expected);
                expected = expected.wrapping_add(1);
            }
            consumed += 32;
        }
        producer.join().unwrap();
    }
}
