//! Stream abstraction for TLS and plain TCP.
//!
//! Conversations are driven synchronously, so the stream types here are
//! blocking: a plain `TcpStream` or a rustls `StreamOwned`. A
//! [`SharedStream`] splits one duplex stream into cloneable read and write
//! handles; the protocol is strictly request-then-response, so the halves
//! never contend.

use parking_lot::Mutex;
use rustls::{ServerConnection, StreamOwned};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

/// A blocking stream that is either plain TCP or TLS.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

impl MaybeTlsStream {
    /// Returns whether this stream is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, MaybeTlsStream::Tls(_))
    }

    /// The underlying TCP stream.
    pub fn tcp(&self) -> &TcpStream {
        match self {
            MaybeTlsStream::Plain(stream) => stream,
            MaybeTlsStream::Tls(stream) => stream.get_ref(),
        }
    }
}

impl Read for MaybeTlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Plain(stream) => stream.read(buf),
            MaybeTlsStream::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for MaybeTlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Plain(stream) => stream.write(buf),
            MaybeTlsStream::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsStream::Plain(stream) => stream.flush(),
            MaybeTlsStream::Tls(stream) => stream.flush(),
        }
    }
}

/// Cloneable handle over one duplex stream, so the conversation reader and
/// the response composer can each own a half.
#[derive(Clone)]
pub struct SharedStream(Arc<Mutex<MaybeTlsStream>>);

impl SharedStream {
    pub fn new(stream: MaybeTlsStream) -> Self {
        Self(Arc::new(Mutex::new(stream)))
    }
}

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().read(buf)
    }
}

impl Write for SharedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}
