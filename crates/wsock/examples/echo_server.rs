//! Echo server on 127.0.0.1:9001.
//!
//! Run with `cargo run --example echo_server`, then point any WebSocket
//! client at `ws://127.0.0.1:9001/`.

use std::{convert::Infallible, sync::Arc};

use http_body_util::Empty;
use hyper::{Request, Response, StatusCode, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use wsock::{Config, HttpResponse, Socket};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = Config {
        open_handler: Some(Arc::new(|sock| {
            println!("open: {} from {}", sock.path(), sock.remote());
        })),
        message_handler: Some(Arc::new(|sock, opcode, payload| {
            let sock = Arc::clone(sock);
            tokio::spawn(async move {
                if let Err(err) = sock.write(opcode, &payload).await {
                    eprintln!("echo failed: {err}");
                }
            });
        })),
        close_handler: Some(Arc::new(|sock, code| {
            println!("close: {} code={code}", sock.remote());
        })),
        ..Config::default()
    };

    let listener = TcpListener::bind("127.0.0.1:9001").await?;
    println!("listening on ws://127.0.0.1:9001/");

    loop {
        let (stream, peer) = listener.accept().await?;
        let config = config.clone();
        tokio::spawn(async move {
            let service = service_fn(move |mut req: Request<Incoming>| {
                let config = config.clone();
                async move {
                    let response = Socket::accept(&mut req, Some(peer), config)
                        .unwrap_or_else(|| {
                            Response::builder()
                                .status(StatusCode::NOT_FOUND)
                                .body(Empty::new())
                                .unwrap()
                        });
                    Ok::<HttpResponse, Infallible>(response)
                }
            });
            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                eprintln!("connection error: {err}");
            }
        });
    }
}
