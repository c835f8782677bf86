//! The tagged event stream over a byte channel: read side.
//!
//! A [`Conversation`] turns raw bytes into a properly nested sequence of
//! BEGIN/END events, enforces that nesting, decodes inline payloads on
//! demand, and hosts the observer scoping the hash discipline depends on.

use crate::channel::{ByteReader, Observer, ObserverId};
use crate::error::ProtocolError;
use crate::event::Event;
use crate::format::Format;
use crate::tag::Tag;
use crate::varint::read_varint_with;
use crate::{MARKER_BEGIN, MARKER_END, MAGIC, PROTOCOL_VERSION};
use std::io::{ErrorKind, Read};

/// Reads the stream preamble (magic + protocol version), returning the
/// peer's version. Callers negotiate on the result before constructing a
/// conversation.
pub fn read_preamble(reader: &mut impl Read) -> Result<u16, ProtocolError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(ProtocolError::InvalidMagic(magic));
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    Ok(u16::from_be_bytes(version))
}

/// One logical exchange's event-stream view over an input byte channel.
#[derive(Debug)]
pub struct Conversation<R: Read> {
    channel: ByteReader<R>,
    /// Stack of open tags, innermost last.
    open: Vec<Tag>,
    /// Unread inline payload of the most recent BEGIN.
    pending: Option<(Tag, u64)>,
    version: u16,
}

impl<R: Read> Conversation<R> {
    /// Reads and validates the preamble, requiring this implementation's
    /// own protocol version.
    pub fn handshake(mut inner: R) -> Result<Self, ProtocolError> {
        let version = read_preamble(&mut inner)?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        Ok(Self::resume(inner, version))
    }

    /// Wraps a stream whose preamble the caller has already consumed
    /// (version negotiation happens outside the conversation).
    pub fn resume(inner: R, version: u16) -> Self {
        Self {
            channel: ByteReader::new(inner),
            open: Vec::new(),
            pending: None,
            version,
        }
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Current element nesting depth.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Produces the next event, or `None` at a clean end of the stream.
    ///
    /// End-of-stream is only clean while no element is open; EOF inside an
    /// element is always a fatal protocol error, as is a mismatched or
    /// unbalanced END and any unknown marker byte.
    pub fn next(&mut self) -> Result<Option<Event>, ProtocolError> {
        self.drain_pending()?;
        if self.open.is_empty() {
            if !self.channel.has_more()? {
                return Ok(None);
            }
        } else if !self.channel.has_more()? {
            return Err(ProtocolError::UnexpectedEof(self.open.len()));
        }

        let marker = self.guard(|c| c.channel.read_byte())?;
        match marker {
            MARKER_BEGIN => {
                let tag = self.read_tag_code()?;
                let len = self.read_length()?;
                self.open.push(tag);
                self.pending = Some((tag, len));
                Ok(Some(Event::begin(tag)))
            }
            MARKER_END => {
                let tag = self.read_tag_code()?;
                match self.open.pop() {
                    None => Err(ProtocolError::UnbalancedEnd(tag)),
                    Some(top) if top != tag => Err(ProtocolError::MismatchedEnd {
                        expected: top,
                        actual: tag,
                    }),
                    Some(_) => Ok(Some(Event::end(tag))),
                }
            }
            other => Err(ProtocolError::UnknownMarker(other)),
        }
    }

    /// Decodes the inline payload of the current BEGIN element.
    ///
    /// Valid at most once per element, and only while that element's BEGIN
    /// is the most recently produced event.
    pub fn read<T>(&mut self, format: &impl Format<T>) -> Result<T, ProtocolError> {
        let (tag, len) = self.pending.take().ok_or(ProtocolError::ValueUnavailable)?;
        let mut buf = vec![0u8; len as usize];
        self.guard(|c| c.channel.read_exact(&mut buf))?;
        format.decode(tag, &buf)
    }

    /// Like [`read`](Self::read), with the given observer suspended around
    /// the payload bytes only; the element's framing bytes stay observed.
    pub fn read_suspending<T>(
        &mut self,
        format: &impl Format<T>,
        id: ObserverId,
    ) -> Result<T, ProtocolError> {
        self.with_suspended(id, |c| c.read(format))
    }

    /// Consumes and discards the rest of the current element's subtree.
    ///
    /// Used when a controller does not recognize a tag: the stream stays
    /// well-formed and no format decode runs. Discarded bytes still feed
    /// active observers.
    pub fn skip(&mut self) -> Result<(), ProtocolError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.next()? {
                Some(ev) if ev.is_begin() => depth += 1,
                Some(_) => depth -= 1,
                None => return Err(ProtocolError::UnexpectedEof(self.open.len())),
            }
        }
        Ok(())
    }

    /// Attaches a byte observer; it sees every byte consumed from here on.
    pub fn attach(&mut self, observer: Observer) -> ObserverId {
        self.channel.observers().attach(observer)
    }

    /// Detaches an observer, returning it for finalization.
    pub fn detach(&mut self, id: ObserverId) -> Result<Observer, ProtocolError> {
        self.channel.observers().detach(id)
    }

    /// Runs `body` with one observer suspended, restoring it on every exit
    /// path, error paths included.
    pub fn with_suspended<T>(
        &mut self,
        id: ObserverId,
        body: impl FnOnce(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        self.channel.observers().set_active(id, false)?;
        let result = body(self);
        self.channel.observers().set_active(id, true)?;
        result
    }

    fn drain_pending(&mut self) -> Result<(), ProtocolError> {
        if let Some((_, len)) = self.pending.take() {
            self.guard(|c| c.channel.discard(len))?;
        }
        Ok(())
    }

    fn read_tag_code(&mut self) -> Result<Tag, ProtocolError> {
        let hi = self.guard(|c| c.channel.read_byte())?;
        let lo = self.guard(|c| c.channel.read_byte())?;
        Tag::from_code(u16::from_be_bytes([hi, lo]))
    }

    fn read_length(&mut self) -> Result<u64, ProtocolError> {
        let (len, _) = self.guard(|c| {
            let channel = &mut c.channel;
            read_varint_with(|| channel.read_byte())
        })?;
        Ok(len)
    }

    /// Maps a mid-element EOF from the channel into the structural error.
    fn guard<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let depth = self.open.len();
        body(self).map_err(|e| match e {
            ProtocolError::Io(ref io) if io.kind() == ErrorKind::UnexpectedEof => {
                ProtocolError::UnexpectedEof(depth.max(1))
            }
            other => other,
        })
    }
}
