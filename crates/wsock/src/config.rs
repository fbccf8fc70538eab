//! Session configuration, option clamping and embedder callbacks.

use std::{any::Any, sync::Arc, time::Duration};

use bytes::Bytes;
use hyper::HeaderMap;
use url::Url;

use crate::{OpCode, Socket};

/// Called once the handshake completes and the receive task is about to run.
pub type OpenHandler = Arc<dyn Fn(&Arc<Socket>) + Send + Sync>;

/// Called with every reassembled message. The payload is handed over by
/// value; keeping the [`Bytes`] keeps the buffer alive.
pub type MessageHandler = Arc<dyn Fn(&Arc<Socket>, OpCode, Bytes) + Send + Sync>;

/// Called exactly once when the session terminates. A code of zero means the
/// transport ended without a CLOSE frame.
pub type CloseHandler = Arc<dyn Fn(&Arc<Socket>, u16) + Send + Sync>;

/// Maps an endpoint URL to the proxy that should carry it, if any.
pub type ProxyResolver = Arc<dyn Fn(&Url) -> Option<Url> + Send + Sync>;

/// Options for a socket, clamped before use.
///
/// Zero values mean "use the default" for the numeric options and "leave the
/// OS default" for the two buffer sizes. [`Config::clamped`] applies the
/// defaults and bounds; it is idempotent and runs automatically inside
/// [`Socket::dial`] and [`Socket::accept`].
#[derive(Clone, Default)]
pub struct Config {
    /// Resolves the proxy for an endpoint; `None` reads
    /// `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` from the environment.
    pub proxy: Option<ProxyResolver>,
    /// TLS connector override for `wss` endpoints.
    pub tls: Option<tokio_rustls::TlsConnector>,
    /// Extra headers sent with the upgrade request.
    pub headers: HeaderMap,
    /// Subprotocols offered (client) or served (server).
    pub protocols: Vec<String>,
    /// Fail the handshake when no subprotocol is negotiated.
    pub need_protocol: bool,
    /// Stream read chunk size. Default 4 KiB, range 4 KiB..=256 KiB.
    pub read_size: usize,
    /// Outgoing fragment payload size. Default 16 KiB, range 4 KiB..=1 MiB.
    pub fragment_size: usize,
    /// Reassembled message cap. Default 4 MiB, range 4 KiB..=64 MiB.
    pub message_size: usize,
    /// Time allowed for the whole connect + upgrade exchange. Default 10 s,
    /// range 1 s..=30 s.
    pub connect_timeout: Duration,
    /// Silence on the read side before an outbound PING. Default 15 s,
    /// range 1 s..=30 s.
    pub probe_timeout: Duration,
    /// Silence on the read side before the socket expires. Default three
    /// probe timeouts, range (probe + 1 s)..=(5 × probe).
    pub inactive_timeout: Duration,
    /// Deadline for a single wire write. Default 10 s, range 1 s..=30 s.
    pub write_timeout: Duration,
    /// SO_RCVBUF for dialed sockets; zero leaves the OS default.
    pub read_buffer_size: usize,
    /// SO_SNDBUF for dialed sockets; zero leaves the OS default.
    pub write_buffer_size: usize,
    /// Invoked when the session opens.
    pub open_handler: Option<OpenHandler>,
    /// Invoked per reassembled message.
    pub message_handler: Option<MessageHandler>,
    /// Invoked exactly once when the session closes.
    pub close_handler: Option<CloseHandler>,
    /// Opaque embedder state exposed through [`Socket::context`].
    pub context: Option<Arc<dyn Any + Send + Sync>>,
}

const SECOND: Duration = Duration::from_secs(1);

impl Config {
    /// Applies defaults and bounds to every numeric option.
    pub fn clamped(mut self) -> Self {
        self.read_size = cval(self.read_size, 4 << 10, 4 << 10, 256 << 10);
        self.fragment_size = cval(self.fragment_size, 16 << 10, 4 << 10, 1 << 20);
        self.message_size = cval(self.message_size, 4 << 20, 4 << 10, 64 << 20);
        self.connect_timeout = cdur(self.connect_timeout, 10 * SECOND, SECOND, 30 * SECOND);
        self.probe_timeout = cdur(self.probe_timeout, 15 * SECOND, SECOND, 30 * SECOND);
        self.inactive_timeout = cdur(
            self.inactive_timeout,
            3 * self.probe_timeout,
            self.probe_timeout + SECOND,
            5 * self.probe_timeout,
        );
        self.write_timeout = cdur(self.write_timeout, 10 * SECOND, SECOND, 30 * SECOND);
        if self.read_buffer_size != 0 {
            self.read_buffer_size = cval(self.read_buffer_size, 4 << 10, 4 << 10, 32 << 20);
        }
        if self.write_buffer_size != 0 {
            self.write_buffer_size = cval(self.write_buffer_size, 4 << 10, 4 << 10, 32 << 20);
        }
        self
    }
}

fn cval(value: usize, fallback: usize, min: usize, max: usize) -> usize {
    let value = if value == 0 { fallback } else { value };
    value.clamp(min, max)
}

fn cdur(value: Duration, fallback: Duration, min: Duration, max: Duration) -> Duration {
    let value = if value.is_zero() { fallback } else { value };
    value.clamp(min, max)
}
