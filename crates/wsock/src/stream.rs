//! Boxed duplex transport.
//!
//! Handshakes layer TLS (possibly twice, when tunneling to an `https` target
//! through an `https` proxy) over TCP or over a hyper-upgraded connection.
//! Boxing behind one object-safe trait keeps [`crate::Socket`] independent of
//! the concrete stack.

use tokio::io::{AsyncRead, AsyncWrite};

/// Any duplex byte stream a socket can run over.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> RawStream for T {}

pub(crate) type BoxStream = Box<dyn RawStream>;
