//! # wsock
//!
//! A bidirectional WebSocket endpoint (RFC 6455, version 13) usable as both
//! client and server over any duplex byte stream.
//!
//! The crate drives a complete session for the embedder: it performs the HTTP
//! upgrade handshake (including `CONNECT` proxy traversal with optional TLS),
//! parses and emits frames, enforces the masking rules of both roles,
//! reassembles fragmented messages up to a configurable size, and keeps the
//! connection alive with timeout-driven PING/PONG probes and inactivity
//! expiry. Sessions are callback-driven: the embedder supplies open, message
//! and close handlers in [`Config`] and talks back through
//! [`Socket::write`] and [`Socket::close`].
//!
//! # Client
//! ```no_run
//! use std::sync::Arc;
//!
//! use wsock::{Config, OpCode, Socket};
//!
//! #[tokio::main]
//! async fn main() -> wsock::Result<()> {
//!     let config = Config {
//!         message_handler: Some(Arc::new(|sock, opcode, payload| {
//!             println!("{opcode:?}: {} bytes", payload.len());
//!             let sock = Arc::clone(sock);
//!             tokio::spawn(async move { sock.close(1000).await });
//!         })),
//!         ..Config::default()
//!     };
//!
//!     let sock = Socket::dial("wss://echo.websocket.org", "", config).await?;
//!     sock.write(OpCode::Text, b"hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Server
//!
//! [`Socket::accept`] consumes an already-parsed [`hyper::Request`] and
//! returns the response to send back. On a successful upgrade the socket is
//! handed to the configured open handler once the protocol switch completes:
//!
//! ```no_run
//! use hyper::{Request, body::Incoming};
//! use wsock::{Config, Socket};
//!
//! fn route(mut req: Request<Incoming>, config: Config) -> Option<wsock::HttpResponse> {
//!     Socket::accept(&mut req, None, config)
//! }
//! ```

mod accept;
mod clock;
pub mod codec;
mod config;
pub mod frame;
mod handshake;
#[doc(hidden)]
pub mod mask;
mod proxy;
mod socket;
mod stream;

pub use accept::HttpResponse;
pub use config::{CloseHandler, Config, MessageHandler, OpenHandler, ProxyResolver};
pub use frame::{Frame, OpCode};
pub use socket::{Role, Socket};
use thiserror::Error;

/// GUID appended to the client key when computing `Sec-WebSocket-Accept`.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this crate speaks.
pub const WEBSOCKET_VERSION: &str = "13";

/// Close code for protocol violations.
pub const CLOSE_PROTOCOL: u16 = 1002;
/// Close code for payloads that fail validation (non-UTF-8 text).
pub const CLOSE_INVALID: u16 = 1007;
/// Close code for messages or control frames beyond the allowed size.
pub const CLOSE_OVERSIZED: u16 = 1009;

/// Result type for WebSocket operations.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Errors surfaced by handshakes and frame processing.
///
/// The handshake paths ([`Socket::dial`], [`Socket::accept`]) return these
/// directly. After the handshake nothing is surfaced synchronously: a failure
/// terminates the receive task, which reports through the close handler with
/// the code from [`WebSocketError::close_code`].
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// Upgrade response status was not 101.
    #[error("invalid protocol upgrade (status {0})")]
    InvalidStatusCode(u16),

    /// Missing or wrong `Upgrade: websocket` header.
    #[error("invalid upgrade header")]
    InvalidUpgradeHeader,

    /// Missing or wrong `Connection: upgrade` header.
    #[error("invalid connection header")]
    InvalidConnectionHeader,

    /// `Sec-WebSocket-Accept` did not match the key digest.
    #[error("invalid accept key")]
    InvalidAcceptKey,

    /// A subprotocol was required but the peer did not negotiate one.
    #[error("could not negotiate a subprotocol")]
    NoProtocolNegotiated,

    /// Endpoint scheme is not ws/wss (or http/https).
    #[error("invalid endpoint scheme")]
    InvalidScheme,

    /// Proxy refused the tunnel.
    #[error("proxy connection error (status {0})")]
    ProxyConnect(u16),

    /// The connect deadline elapsed before the upgrade completed.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Server-role endpoint received an unmasked frame.
    #[error("unmasked frame from client")]
    UnmaskedFrame,

    /// Client-role endpoint received a masked frame.
    #[error("masked frame from server")]
    MaskedFrame,

    /// Control frame with the FIN bit clear.
    #[error("fragmented control frame")]
    FragmentedControlFrame,

    /// Opcode (or nonzero RSV bits) outside the protocol.
    #[error("invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// Data frame received while another message was being reassembled.
    #[error("data frame interleaved with an unfinished message")]
    InvalidFragment,

    /// Continuation frame without a message in progress.
    #[error("continuation frame without a message in progress")]
    InvalidContinuationFrame,

    /// Text message holding invalid UTF-8.
    #[error("invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Control frame payload above the 125-byte protocol limit.
    #[error("control frame payload exceeds 125 bytes")]
    ControlFrameTooLarge,

    /// Text or binary frame declaring an empty payload.
    #[error("empty data frame")]
    EmptyDataFrame,

    /// Message (declared or accumulated) beyond the configured cap.
    #[error("message exceeds the configured size limit")]
    MessageTooLarge,

    /// The socket is no longer connected.
    #[error("not connected")]
    ConnectionClosed,

    /// A wire write missed its deadline.
    #[error("write timed out")]
    WriteTimeout,

    /// Endpoint URL could not be parsed.
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Transport-level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// HTTP machinery failure during the upgrade.
    #[error(transparent)]
    Hyper(#[from] hyper::Error),

    /// Malformed upgrade request or response.
    #[error(transparent)]
    Http(#[from] hyper::http::Error),
}

impl WebSocketError {
    /// Close code sent on the wire when this error aborts a session.
    ///
    /// Zero means the transport terminated without a CLOSE frame.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::UnmaskedFrame
            | Self::MaskedFrame
            | Self::FragmentedControlFrame
            | Self::InvalidOpCode(_)
            | Self::InvalidFragment
            | Self::InvalidContinuationFrame => CLOSE_PROTOCOL,
            Self::InvalidUtf8 => CLOSE_INVALID,
            Self::ControlFrameTooLarge | Self::EmptyDataFrame | Self::MessageTooLarge => {
                CLOSE_OVERSIZED
            }
            _ => 0,
        }
    }

    /// Returns `true` if the upgrade itself was rejected.
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatusCode(_)
                | Self::InvalidUpgradeHeader
                | Self::InvalidConnectionHeader
                | Self::InvalidAcceptKey
                | Self::NoProtocolNegotiated
                | Self::InvalidScheme
        )
    }

    /// Returns `true` if the peer violated RFC 6455 framing rules.
    pub fn is_protocol_error(&self) -> bool {
        self.close_code() == CLOSE_PROTOCOL
    }
}
