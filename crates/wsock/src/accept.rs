//! Server-side upgrade acceptance: [`Socket::accept`].
//!
//! The caller hands in an already-parsed HTTP request. When it is a
//! WebSocket upgrade, `accept` claims it and returns the response to send
//! (101 on success, 400/405 on a malformed attempt); the protocol switch
//! itself completes in a spawned task that builds the socket and runs its
//! receive loop. `None` means the request was not an upgrade and still
//! belongs to the caller.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};

use crate::{
    Config, Role, Socket, WEBSOCKET_GUID, WEBSOCKET_VERSION, socket::Identity,
};

/// Response type produced by [`Socket::accept`].
pub type HttpResponse = Response<Empty<Bytes>>;

impl Socket {
    /// Claims `request` when it asks for a WebSocket upgrade.
    ///
    /// Returns `None` when the request is not an upgrade (no headers were
    /// touched). Otherwise the returned response must be sent to the peer:
    /// 405 for a non-GET method, 400 for a missing key or wrong version (or
    /// an unsatisfied subprotocol requirement), 101 when the handshake is
    /// accepted. On 101 the stream is taken over once hyper completes the
    /// switch; the socket then reaches the embedder through the open
    /// handler. `peer` is reported by [`Socket::remote`] when given.
    pub fn accept<B>(
        request: &mut Request<B>,
        peer: Option<SocketAddr>,
        config: Config,
    ) -> Option<HttpResponse> {
        let headers = request.headers();
        let connection_upgrade = headers
            .get(header::CONNECTION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().contains("upgrade"))
            .unwrap_or(false);
        let websocket_upgrade = headers
            .get(header::UPGRADE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        if !connection_upgrade || !websocket_upgrade {
            return None;
        }

        if request.method() != Method::GET {
            return Some(status_only(StatusCode::METHOD_NOT_ALLOWED));
        }

        let key = headers
            .get(header::SEC_WEBSOCKET_KEY)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let version_13 = headers
            .get(header::SEC_WEBSOCKET_VERSION)
            .map(|value| value.as_bytes() == WEBSOCKET_VERSION.as_bytes())
            .unwrap_or(false);
        if key.is_empty() || !version_13 {
            let response = Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header(header::SEC_WEBSOCKET_VERSION, WEBSOCKET_VERSION)
                .body(Empty::new())
                .expect("static response");
            return Some(response);
        }

        let offered = headers
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let protocol = negotiate(offered, &config.protocols);
        if protocol.is_empty() && !config.protocols.is_empty() && config.need_protocol {
            return Some(status_only(StatusCode::BAD_REQUEST));
        }

        let mut builder = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_ACCEPT, accept_key(key.as_bytes()));
        if !protocol.is_empty() {
            builder = builder.header(header::SEC_WEBSOCKET_PROTOCOL, protocol.as_str());
        }
        let response = builder.body(Empty::new()).expect("static response");

        let mut origin = headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if origin.eq_ignore_ascii_case("null") {
            origin.clear();
        }
        let identity = Identity {
            path: request.uri().path().to_string(),
            origin,
            agent: headers
                .get(header::USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string(),
            remote: peer.map(|addr| addr.to_string()).unwrap_or_default(),
            protocol,
        };

        let config = config.clamped();
        let on_upgrade = hyper::upgrade::on(request);
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    // Bytes hyper buffered past the request stay inside the
                    // upgraded stream and reach the decoder first.
                    tracing::debug!(path = %identity.path, remote = %identity.remote, "websocket accepted");
                    Socket::start(
                        Role::Server,
                        Box::new(TokioIo::new(upgraded)),
                        Bytes::new(),
                        identity,
                        config,
                    );
                }
                Err(err) => tracing::error!(%err, "protocol switch failed"),
            }
        });

        Some(response)
    }
}

fn status_only(status: StatusCode) -> HttpResponse {
    Response::builder()
        .status(status)
        .body(Empty::new())
        .expect("static response")
}

/// Picks the last client-offered subprotocol present in `served`; empty when
/// nothing matches. The offer list is split on commas and spaces.
fn negotiate(offered: &str, served: &[String]) -> String {
    if served.is_empty() {
        return String::new();
    }
    offered
        .split([',', ' '])
        .filter(|token| !token.is_empty())
        .filter(|token| served.iter().any(|name| name == token))
        .next_back()
        .unwrap_or_default()
        .to_string()
}

/// `base64(SHA1(key || GUID))`, shared by both handshake directions.
pub(crate) fn accept_key(key: &[u8]) -> String {
    use base64::prelude::*;
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}
