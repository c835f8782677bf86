//! The tagged event stream over a byte channel: write side.
//!
//! Well-formedness is guaranteed by construction: containers are written
//! through scoped closures that always emit the matching END, and
//! [`Composer::finish`] refuses to release a stream with open elements.

use crate::channel::{ByteWriter, Observer, ObserverId};
use crate::error::ProtocolError;
use crate::format::Format;
use crate::tag::Tag;
use crate::varint::write_varint;
use crate::{MARKER_BEGIN, MARKER_END, MAGIC, MAX_VALUE_SIZE, PROTOCOL_VERSION};
use std::io::Write;

/// Wire bytes of an element's BEGIN header (marker, tag code, length).
pub fn element_head(tag: Tag, len: u64) -> Vec<u8> {
    let mut out = vec![MARKER_BEGIN];
    out.extend_from_slice(&tag.code().to_be_bytes());
    write_varint(len, &mut out);
    out
}

/// Wire bytes of an element's END marker.
pub fn element_end(tag: Tag) -> Vec<u8> {
    let mut out = vec![MARKER_END];
    out.extend_from_slice(&tag.code().to_be_bytes());
    out
}

/// Wire bytes of a complete leaf element.
pub fn element_bytes(tag: Tag, payload: &[u8]) -> Vec<u8> {
    let mut out = element_head(tag, payload.len() as u64);
    out.extend_from_slice(payload);
    out.extend_from_slice(&element_end(tag));
    out
}

/// Encode-side counterpart of a conversation.
pub struct Composer<W: Write> {
    channel: ByteWriter<W>,
    open: Vec<Tag>,
}

impl<W: Write> Composer<W> {
    /// Starts an output stream, writing the preamble.
    pub fn handshake(inner: W) -> Result<Self, ProtocolError> {
        let mut composer = Self::raw(inner);
        composer.channel.write_all(&MAGIC)?;
        composer
            .channel
            .write_all(&PROTOCOL_VERSION.to_be_bytes())?;
        Ok(composer)
    }

    /// Starts a bare element stream with no preamble; used to compose
    /// subtrees into buffers before splicing them into a conversation.
    pub fn raw(inner: W) -> Self {
        Self {
            channel: ByteWriter::new(inner),
            open: Vec::new(),
        }
    }

    /// Opens an element, writing its inline payload immediately.
    pub fn begin(&mut self, tag: Tag, payload: &[u8]) -> Result<(), ProtocolError> {
        self.begin_head(tag, payload)?;
        self.channel.write_all(payload)?;
        Ok(())
    }

    /// Opens an element with the given observer suspended around the
    /// payload bytes only; the framing bytes stay observed.
    pub fn begin_suspending(
        &mut self,
        tag: Tag,
        payload: &[u8],
        id: ObserverId,
    ) -> Result<(), ProtocolError> {
        self.begin_head(tag, payload)?;
        self.channel.observers().set_active(id, false)?;
        let result = self.channel.write_all(payload);
        self.channel.observers().set_active(id, true)?;
        result
    }

    fn begin_head(&mut self, tag: Tag, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.len() as u64 > MAX_VALUE_SIZE {
            return Err(ProtocolError::ValueTooLarge {
                size: payload.len() as u64,
                max: MAX_VALUE_SIZE,
            });
        }
        self.channel
            .write_all(&element_head(tag, payload.len() as u64))?;
        self.open.push(tag);
        Ok(())
    }

    /// Closes the innermost element, which must match `tag`.
    pub fn end(&mut self, tag: Tag) -> Result<(), ProtocolError> {
        match self.open.pop() {
            None => return Err(ProtocolError::UnbalancedEnd(tag)),
            Some(top) if top != tag => {
                return Err(ProtocolError::MismatchedEnd {
                    expected: top,
                    actual: tag,
                })
            }
            Some(_) => {}
        }
        self.channel.write_all(&element_end(tag))
    }

    /// Writes a container: BEGIN, body, END, in one scope.
    pub fn container<T>(
        &mut self,
        tag: Tag,
        body: impl FnOnce(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        self.begin(tag, &[])?;
        let value = body(self)?;
        self.end(tag)?;
        Ok(value)
    }

    /// Writes a complete leaf element with an encoded value.
    pub fn value<T>(
        &mut self,
        tag: Tag,
        format: &impl Format<T>,
        value: &T,
    ) -> Result<(), ProtocolError> {
        self.begin(tag, &format.encode(value))?;
        self.end(tag)
    }

    /// Like [`value`](Self::value), with one observer suspended around the
    /// payload bytes.
    pub fn value_suspending<T>(
        &mut self,
        tag: Tag,
        format: &impl Format<T>,
        value: &T,
        id: ObserverId,
    ) -> Result<(), ProtocolError> {
        self.begin_suspending(tag, &format.encode(value), id)?;
        self.end(tag)
    }

    /// Splices preserialized, balanced element bytes into the stream.
    pub fn splice(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.channel.write_all(bytes)
    }

    /// Attaches a byte observer to the output channel.
    pub fn attach(&mut self, observer: Observer) -> ObserverId {
        self.channel.observers().attach(observer)
    }

    /// Detaches an observer, returning it for finalization.
    pub fn detach(&mut self, id: ObserverId) -> Result<Observer, ProtocolError> {
        self.channel.observers().detach(id)
    }

    /// Flushes buffered bytes to the underlying stream.
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.channel.flush()
    }

    /// Flushes and returns the underlying stream; every element must be
    /// closed.
    pub fn finish(mut self) -> Result<W, ProtocolError> {
        if let Some(&tag) = self.open.last() {
            return Err(ProtocolError::UnclosedElement(tag));
        }
        self.channel.flush()?;
        self.channel.into_inner()
    }
}
