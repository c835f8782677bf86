//! Session bookkeeping.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use uuid::Uuid;

/// One client connection's bookkeeping: identity, negotiated version, and
/// activity accounting for idle handling.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Negotiated protocol version; zero until the preamble is read.
    version: AtomicU64,

    /// Request counter.
    request_count: AtomicU64,

    /// Session creation time.
    created_at: Instant,

    /// Last activity time.
    last_activity: parking_lot::Mutex<Instant>,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            version: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
            created_at: Instant::now(),
            last_activity: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Records the negotiated protocol version.
    pub fn set_version(&self, version: u16) {
        self.version.store(u64::from(version), Ordering::Relaxed);
    }

    /// Returns the negotiated protocol version.
    pub fn version(&self) -> u16 {
        self.version.load(Ordering::Relaxed) as u16
    }

    /// Records a request.
    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        *self.last_activity.lock() = Instant::now();
    }

    /// Returns the request count.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Returns the time since last activity.
    pub fn idle_duration(&self) -> std::time::Duration {
        self.last_activity.lock().elapsed()
    }

    /// Returns the session age.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
