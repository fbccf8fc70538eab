//! Post-handshake session state machine.
//!
//! Every socket owns exactly one receive task, spawned by the handshake. The
//! task drives frame decoding, reassembly, control handling and keepalive,
//! and delivers messages to the embedder's callbacks. User tasks talk to the
//! wire through [`Socket::write`] and [`Socket::close`]; three mutexes keep
//! the paths apart: the write mutex serializes wire writes (user sends,
//! PONG replies, probes, CLOSE), the dispatch mutex keeps the fragments of
//! one message contiguous, and the close mutex makes teardown exactly-once.

use std::{
    any::Any,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{self, AsyncWriteExt},
    sync::Mutex,
    time::{Instant, timeout_at},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    Config, Result, WebSocketError, clock,
    codec::{Decoder, Encoder},
    frame::{Frame, OpCode},
    stream::BoxStream,
};

type Reader = FramedRead<io::ReadHalf<BoxStream>, Decoder>;

/// The role an endpoint plays. Client-role sockets mask every outbound
/// frame; server-role sockets never do and reject unmasked input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// Session metadata captured during the handshake.
#[derive(Default)]
pub(crate) struct Identity {
    pub(crate) path: String,
    pub(crate) origin: String,
    pub(crate) agent: String,
    pub(crate) remote: String,
    pub(crate) protocol: String,
}

struct WriteState {
    sink: FramedWrite<io::WriteHalf<BoxStream>, Encoder>,
    deadline: Instant,
    refreshed: u64,
}

/// An active WebSocket endpoint.
///
/// Created by [`Socket::dial`] or [`Socket::accept`] and shared as
/// `Arc<Socket>`; the same handle is passed to every callback. Dropping the
/// last reference does not terminate the session — call [`Socket::close`].
pub struct Socket {
    identity: Identity,
    role: Role,
    config: Config,
    connected: AtomicBool,
    closing: Mutex<bool>,
    writer: Mutex<WriteState>,
    dispatch: Mutex<()>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("role", &self.role)
            .field("path", &self.identity.path)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Socket {
    /// Builds the socket over `stream`, runs the open handler and spawns the
    /// receive task. `leftover` holds bytes read past the handshake; they
    /// reach the decoder before anything from the stream.
    pub(crate) fn start(
        role: Role,
        stream: BoxStream,
        leftover: Bytes,
        identity: Identity,
        config: Config,
    ) -> Arc<Socket> {
        let (read_half, write_half) = io::split(stream);
        let mut reader = FramedRead::with_capacity(
            read_half,
            Decoder::new(role, config.message_size),
            config.read_size,
        );
        if !leftover.is_empty() {
            reader.read_buffer_mut().extend_from_slice(&leftover);
        }

        let shutdown = CancellationToken::new();
        clock::spawn_ticker(shutdown.clone());

        let sock = Arc::new(Socket {
            identity,
            role,
            connected: AtomicBool::new(true),
            closing: Mutex::new(false),
            writer: Mutex::new(WriteState {
                sink: FramedWrite::new(write_half, Encoder::new(role)),
                deadline: Instant::now() + config.write_timeout,
                refreshed: clock::now(),
            }),
            dispatch: Mutex::new(()),
            shutdown,
            config,
        });

        if let Some(handler) = &sock.config.open_handler {
            handler(&sock);
        }
        tokio::spawn(Arc::clone(&sock).receive(reader));
        sock
    }

    /// Request path negotiated during the handshake.
    pub fn path(&self) -> &str {
        &self.identity.path
    }

    /// `Origin` header value, empty when absent.
    pub fn origin(&self) -> &str {
        &self.identity.origin
    }

    /// Peer's `User-Agent` (server side), empty when absent.
    pub fn agent(&self) -> &str {
        &self.identity.agent
    }

    /// Remote address of the underlying stream, when known.
    pub fn remote(&self) -> &str {
        &self.identity.remote
    }

    /// Negotiated subprotocol, empty when none.
    pub fn protocol(&self) -> &str {
        &self.identity.protocol
    }

    /// Opaque embedder state from [`Config::context`].
    pub fn context(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.config.context.as_ref()
    }

    /// Role this endpoint plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns `true` for sockets created by [`Socket::dial`].
    pub fn is_client(&self) -> bool {
        self.role == Role::Client
    }

    /// Returns `true` until the session is torn down.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sends `data` as one message of the given kind.
    ///
    /// Only [`OpCode::Text`] and [`OpCode::Binary`] with a non-empty payload
    /// are sent; anything else is a no-op. Payloads larger than the
    /// configured fragment size leave as a contiguous run of fragments.
    pub async fn write(self: &Arc<Self>, opcode: OpCode, data: &[u8]) -> Result<()> {
        if !matches!(opcode, OpCode::Text | OpCode::Binary) || data.is_empty() {
            return Ok(());
        }

        let _dispatch = self.dispatch.lock().await;
        let message = Frame::new(true, opcode, Bytes::copy_from_slice(data));
        for frame in message.into_fragments(self.config.fragment_size) {
            self.send_frame(frame).await?;
        }
        Ok(())
    }

    /// Tears the session down.
    ///
    /// Idempotent: the first call runs the close handler, emits a CLOSE frame
    /// (with a 2-byte big-endian payload when `code` is nonzero), clears the
    /// connected flag and shuts the stream down; later calls return once the
    /// first has finished. A `code` of zero means the transport ended
    /// without a CLOSE frame.
    pub async fn close(self: &Arc<Self>, code: u16) {
        self.close_boxed(code).await
    }

    // Boxed so the recursive relationship between `close` and `send_frame`
    // (send_frame spawns a task that calls close, close awaits send_frame)
    // doesn't force rustc to resolve an infinite anonymous future type when
    // checking the spawned task for `Send`.
    fn close_boxed(self: &Arc<Self>, code: u16) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut closing = self.closing.lock().await;
            if *closing || !self.is_connected() {
                return;
            }
            *closing = true;

            if let Some(handler) = &self.config.close_handler {
                handler(self, code);
            }
            let _ = self.send_frame(Frame::close(code)).await;

            self.connected.store(false, Ordering::SeqCst);
            self.shutdown.cancel();
            let mut writer = self.writer.lock().await;
            let _ = writer.sink.get_mut().shutdown().await;
        })
    }

    /// Writes one frame under the write mutex and deadline.
    async fn send_frame(self: &Arc<Self>, frame: Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(WebSocketError::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        let lnow = clock::now();
        if lnow.saturating_sub(writer.refreshed) >= clock::SECOND {
            writer.refreshed = lnow;
            writer.deadline = Instant::now() + self.config.write_timeout;
        }
        let deadline = writer.deadline;
        let result = match timeout_at(deadline, writer.sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(WebSocketError::WriteTimeout),
        };
        drop(writer);

        if let Err(err) = &result {
            tracing::debug!(role = %self.role, %err, "write failed");
            let sock = Arc::clone(self);
            tokio::spawn(async move { sock.close(0).await });
        }
        result
    }

    /// The receive task: decodes frames, answers control traffic, reassembles
    /// messages and enforces keepalive until the session ends, then invokes
    /// [`Socket::close`] with the captured code.
    async fn receive(self: Arc<Self>, mut reader: Reader) {
        let probe = self.config.probe_timeout;
        let inactive = self.config.inactive_timeout.as_nanos() as u64;
        let mut assembler = Assembler::new(self.config.message_size);
        let mut code: u16 = 0;
        let mut seen = clock::now();
        let mut refreshed: u64 = 0;
        let mut deadline = Instant::now() + probe;
        let mut buffered = reader.read_buffer().len();

        'session: loop {
            // Rebuild the read deadline at most once per wall-second.
            let lnow = clock::now();
            if lnow.saturating_sub(refreshed) >= clock::SECOND {
                refreshed = lnow;
                deadline = Instant::now() + probe;
            }

            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break 'session,
                event = timeout_at(deadline, reader.next()) => event,
            };

            // Any byte movement counts as liveness, complete frame or not.
            let level = reader.read_buffer().len();
            if level != buffered {
                buffered = level;
                seen = clock::now();
            }

            match event {
                // Read timeout: probe the peer instead of failing.
                Err(_) => {
                    if self.send_frame(Frame::ping(Bytes::new())).await.is_err() {
                        break 'session;
                    }
                }
                Ok(None) => break 'session,
                Ok(Some(Err(err))) => {
                    code = err.close_code();
                    tracing::debug!(role = %self.role, %err, "receive failed");
                    break 'session;
                }
                Ok(Some(Ok(frame))) => {
                    seen = clock::now();
                    match frame.opcode() {
                        OpCode::Close => {
                            code = frame.close_code();
                            break 'session;
                        }
                        OpCode::Ping => {
                            let pong = Frame::pong(frame.payload().clone());
                            if self.send_frame(pong).await.is_err() {
                                break 'session;
                            }
                        }
                        OpCode::Pong => {}
                        _ => match assembler.push(frame) {
                            Ok(Some((opcode, payload))) => {
                                if let Some(handler) = &self.config.message_handler {
                                    handler(&self, opcode, payload);
                                }
                            }
                            Ok(None) => {}
                            Err(err) => {
                                code = err.close_code();
                                tracing::debug!(role = %self.role, %err, "reassembly failed");
                                break 'session;
                            }
                        },
                    }
                }
            }

            if clock::now().saturating_sub(seen) >= inactive {
                tracing::debug!(role = %self.role, "inactivity expiry");
                break 'session;
            }
        }

        self.close(code).await;
    }
}

/// Reassembles fragmented messages up to the configured cap.
struct Assembler {
    opcode: Option<OpCode>,
    buf: BytesMut,
    limit: usize,
}

impl Assembler {
    fn new(limit: usize) -> Self {
        Self {
            opcode: None,
            buf: BytesMut::new(),
            limit,
        }
    }

    /// Feeds one data frame. Returns the completed message, `None` while
    /// fragments are outstanding, or the violation that ends the session.
    fn push(&mut self, frame: Frame) -> Result<Option<(OpCode, Bytes)>> {
        match frame.opcode() {
            OpCode::Text | OpCode::Binary => {
                if self.opcode.is_some() {
                    return Err(WebSocketError::InvalidFragment);
                }
                if frame.fin {
                    // Single-frame message: hand the payload through as-is.
                    return Self::deliver(frame.opcode, frame.payload);
                }
                self.opcode = Some(frame.opcode);
                self.accumulate(&frame.payload)?;
                Ok(None)
            }
            OpCode::Continuation => {
                let opcode = self
                    .opcode
                    .ok_or(WebSocketError::InvalidContinuationFrame)?;
                self.accumulate(&frame.payload)?;
                if frame.fin {
                    self.opcode = None;
                    let payload = std::mem::take(&mut self.buf).freeze();
                    Self::deliver(opcode, payload)
                } else {
                    Ok(None)
                }
            }
            // Control frames are handled before reassembly.
            _ => Ok(None),
        }
    }

    fn accumulate(&mut self, payload: &Bytes) -> Result<()> {
        if self.buf.len() + payload.len() > self.limit {
            return Err(WebSocketError::MessageTooLarge);
        }
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    fn deliver(opcode: OpCode, payload: Bytes) -> Result<Option<(OpCode, Bytes)>> {
        if opcode == OpCode::Text && std::str::from_utf8(&payload).is_err() {
            return Err(WebSocketError::InvalidUtf8);
        }
        Ok(Some((opcode, payload)))
    }
}
