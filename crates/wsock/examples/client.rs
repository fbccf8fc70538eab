//! Minimal client: connects, sends one message, prints the reply.
//!
//! ```sh
//! cargo run --example client -- ws://127.0.0.1:9001/ "hello there"
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use wsock::{Config, OpCode, Socket};

#[tokio::main]
async fn main() -> wsock::Result<()> {
    let mut args = std::env::args().skip(1);
    let endpoint = args.next().unwrap_or_else(|| "ws://127.0.0.1:9001/".into());
    let message = args.next().unwrap_or_else(|| "hello".into());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = Config {
        message_handler: Some(Arc::new(move |_, opcode, payload| {
            let _ = tx.send((opcode, payload));
        })),
        close_handler: Some(Arc::new(|_, code| {
            println!("closed with code {code}");
        })),
        ..Config::default()
    };

    let sock = Socket::dial(&endpoint, "", config).await?;
    println!("connected to {endpoint} (protocol: {:?})", sock.protocol());

    sock.write(OpCode::Text, message.as_bytes()).await?;
    if let Some((opcode, payload)) = rx.recv().await {
        match opcode {
            OpCode::Text => println!("reply: {}", String::from_utf8_lossy(&payload)),
            _ => println!("reply: {} bytes", payload.len()),
        }
    }

    sock.close(1000).await;
    Ok(())
}
