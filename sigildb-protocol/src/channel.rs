//! Byte channel abstraction.
//!
//! [`ByteReader`] and [`ByteWriter`] wrap raw I/O streams and own the
//! ordered observer set: every byte consumed from (or emitted to) the
//! channel while an observer is attached and active is fed to it, marker
//! and length bytes included. This is how digests are computed over exact
//! wire ranges without buffering the stream.

use crate::error::ProtocolError;
use crate::hash::HashKind;
use digest::DynDigest;
use std::io::{ErrorKind, Read, Write};

/// Identity of an attached observer. Removal is by identity, never by
/// position, so independent observers can be attached and detached in any
/// interleaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// A byte-level listener over one channel.
pub enum Observer {
    /// Running digest over observed bytes.
    Digest(Box<dyn DynDigest>),
    /// Verbatim copy of observed bytes.
    Capture(Vec<u8>),
}

impl Observer {
    /// Creates a digest observer for the given algorithm.
    pub fn digest(kind: HashKind) -> Self {
        Observer::Digest(kind.hasher())
    }

    /// Creates a raw-capture observer.
    pub fn capture() -> Self {
        Observer::Capture(Vec::new())
    }

    /// Feeds bytes to the observer, as the channel does for every observed
    /// byte. Public so writers can account for bytes they predict rather
    /// than emit (see the header writer).
    pub fn observe(&mut self, bytes: &[u8]) {
        match self {
            Observer::Digest(hasher) => hasher.update(bytes),
            Observer::Capture(buf) => buf.extend_from_slice(bytes),
        }
    }

    /// Consumes the observer: the finalized digest, or the captured bytes.
    pub fn finish(self) -> Vec<u8> {
        match self {
            Observer::Digest(hasher) => hasher.finalize().to_vec(),
            Observer::Capture(buf) => buf,
        }
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observer::Digest(_) => f.write_str("Observer::Digest"),
            Observer::Capture(buf) => write!(f, "Observer::Capture({} bytes)", buf.len()),
        }
    }
}

#[derive(Debug)]
struct Slot {
    id: u64,
    active: bool,
    observer: Observer,
}

/// Ordered set of observers, mutated only by the thread owning the
/// conversation. Attach/detach follow the nesting of the elements that
/// required them.
#[derive(Debug, Default)]
pub struct ObserverSet {
    slots: Vec<Slot>,
    next_id: u64,
}

impl ObserverSet {
    pub fn attach(&mut self, observer: Observer) -> ObserverId {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push(Slot {
            id,
            active: true,
            observer,
        });
        ObserverId(id)
    }

    pub fn detach(&mut self, id: ObserverId) -> Result<Observer, ProtocolError> {
        let pos = self
            .slots
            .iter()
            .position(|s| s.id == id.0)
            .ok_or(ProtocolError::UnknownObserver(id.0))?;
        Ok(self.slots.remove(pos).observer)
    }

    pub fn set_active(&mut self, id: ObserverId, active: bool) -> Result<(), ProtocolError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.id == id.0)
            .ok_or(ProtocolError::UnknownObserver(id.0))?;
        slot.active = active;
        Ok(())
    }

    pub fn observe(&mut self, bytes: &[u8]) {
        for slot in self.slots.iter_mut().filter(|s| s.active) {
            slot.observer.observe(bytes);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Input side of a conversation's byte stream.
#[derive(Debug)]
pub struct ByteReader<R: Read> {
    inner: R,
    lookahead: Option<u8>,
    closed: bool,
    bytes_read: u64,
    observers: ObserverSet,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            lookahead: None,
            closed: false,
            bytes_read: 0,
            observers: ObserverSet::default(),
        }
    }

    /// Returns whether at least one more byte is available, blocking until
    /// data arrives or the stream ends.
    pub fn has_more(&mut self) -> Result<bool, ProtocolError> {
        if self.lookahead.is_some() {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => {
                    self.closed = true;
                    return Ok(false);
                }
                Ok(_) => {
                    self.lookahead = Some(byte[0]);
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(ProtocolError::Io(e));
                }
            }
        }
    }

    /// Returns whether the underlying stream has reached its end.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Total bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Reads exactly one byte, feeding active observers.
    pub fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        let byte = match self.lookahead.take() {
            Some(b) => b,
            None => {
                let mut buf = [0u8; 1];
                self.fill(&mut buf)?;
                buf[0]
            }
        };
        self.bytes_read += 1;
        self.observers.observe(&[byte]);
        Ok(byte)
    }

    /// Reads exactly `buf.len()` bytes, feeding active observers.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut start = 0;
        if let Some(b) = self.lookahead.take() {
            buf[0] = b;
            start = 1;
        }
        if start < buf.len() {
            self.fill(&mut buf[start..])?;
        }
        self.bytes_read += buf.len() as u64;
        self.observers.observe(buf);
        Ok(())
    }

    /// Reads and discards `count` bytes. Discarded bytes still feed active
    /// observers: skipped subtrees are part of their enclosing hash scopes.
    pub fn discard(&mut self, mut count: u64) -> Result<(), ProtocolError> {
        let mut buf = [0u8; 256];
        while count > 0 {
            let chunk = count.min(buf.len() as u64) as usize;
            self.read_exact(&mut buf[..chunk])?;
            count -= chunk as u64;
        }
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        match self.inner.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.closed = true;
                Err(ProtocolError::Io(e))
            }
        }
    }

    pub fn observers(&mut self) -> &mut ObserverSet {
        &mut self.observers
    }
}

/// Output side of a conversation's byte stream.
pub struct ByteWriter<W: Write> {
    inner: W,
    bytes_written: u64,
    observers: ObserverSet,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
            observers: ObserverSet::default(),
        }
    }

    /// Writes all of `bytes`, feeding active observers.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.inner.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        self.observers.observe(bytes);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Total bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn observers(&mut self) -> &mut ObserverSet {
        &mut self.observers
    }

    /// Flushes and returns the underlying stream.
    pub fn into_inner(mut self) -> Result<W, ProtocolError> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
