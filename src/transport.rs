//! The duplex byte stream a session is generic over, plus an in-memory
//! double for tests that never touch a real socket.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Anything a session can read frames from and write frames to. A `TcpStream`
/// (optionally wrapped in a TLS stream) satisfies this directly.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// One direction of an [`InMemoryTransport`] pair: a byte queue, a condvar to
/// wake a blocked reader when bytes land, and a half-close flag so a reader
/// parked on an empty queue can be told "no more is coming" instead of
/// spinning forever.
struct Pipe {
    buf: Mutex<VecDeque<u8>>,
    ready: Condvar,
    closed: AtomicBool,
}

impl Pipe {
    fn new() -> Self {
        Pipe { buf: Mutex::new(VecDeque::new()), ready: Condvar::new(), closed: AtomicBool::new(false) }
    }
}

/// A byte pipe backed by a pair of in-memory rings, used to drive a
/// [`crate::session::Session`] in tests without a real socket. Two handles
/// share one underlying buffer pair: bytes written on one side become
/// readable on the other. Reads block until data arrives or the writing side
/// calls [`InMemoryTransport::close`], matching a real socket's semantics
/// closely enough for the read pump's blocking `read_exact` calls to behave
/// the same as they would against a `TcpStream`.
#[derive(Clone)]
pub struct InMemoryTransport {
    inbound: Arc<Pipe>,
    outbound: Arc<Pipe>,
}

impl InMemoryTransport {
    /// Returns a connected pair: whatever is written to `a` becomes readable
    /// from `b`, and vice versa.
    pub fn pair() -> (InMemoryTransport, InMemoryTransport) {
        let pipe_a = Arc::new(Pipe::new());
        let pipe_b = Arc::new(Pipe::new());
        let a = InMemoryTransport { inbound: pipe_a.clone(), outbound: pipe_b.clone() };
        let b = InMemoryTransport { inbound: pipe_b, outbound: pipe_a };
        (a, b)
    }

    /// Simulates this side hanging up: a peer blocked reading from `outbound`
    /// drains whatever is already buffered, then gets `Ok(0)` (EOF) rather
    /// than blocking forever. Does not affect this handle's own read side.
    pub fn close(&self) {
        self.outbound.closed.store(true, Ordering::SeqCst);
        self.outbound.ready.notify_all();
    }
}

impl Read for InMemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.inbound.buf.lock().unwrap();
        loop {
            if !queue.is_empty() {
                let n = buf.len().min(queue.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = queue.pop_front().unwrap();
                }
                return Ok(n);
            }
            if self.inbound.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }
            queue = self.inbound.ready.wait(queue).unwrap();
        }
    }
}

impl Write for InMemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut queue = self.outbound.buf.lock().unwrap();
        queue.extend(buf.iter().copied());
        drop(queue);
        self.outbound.ready.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pair_round_trips_bytes() {
        let (mut a, mut b) = InMemoryTransport::pair();
        a.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_blocks_until_a_write_arrives() {
        let (mut a, mut b) = InMemoryTransport::pair();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            a.write_all(b"late").unwrap();
        });
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"late");
        handle.join().unwrap();
    }

    #[test]
    fn close_unblocks_a_pending_read_with_eof() {
        let (a, mut b) = InMemoryTransport::pair();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            a.close();
        });
        let mut buf = [0u8; 1];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(n, 0);
        handle.join().unwrap();
    }
}
