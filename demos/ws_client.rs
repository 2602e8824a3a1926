//! Sends a few messages to an echo server and prints the replies:
//! `cargo run --example ws_client -- ws://127.0.0.1:9001/demo`
use std::time::{Duration, Instant};

use tinyws::idle::IdleStrategy;
use tinyws::ws::{CloseCode, Config, State, Websocket, WebsocketEvent};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:9001/demo".to_owned());
    let config = Config::default()
        .with_handshake_timeout(Duration::from_secs(3))
        .with_header("User-Agent", "tinyws-demo");
    let mut ws = Websocket::connect(&url, config)?;

    ws.on_message(|_, message| match message.as_text() {
        Some(text) => println!("<- {text}"),
        None => println!("<- {} bytes", message.data().len()),
    });
    ws.on_event(|_, event| match event {
        WebsocketEvent::Pong(data) => println!("<- pong {}", String::from_utf8_lossy(&data)),
        WebsocketEvent::Closed(reason) => println!("closed: {reason}"),
        _ => {}
    });

    ws.send_text("hello")?;
    ws.send_binary([0xdeu8, 0xad, 0xbe, 0xef])?;
    ws.ping(b"are you there")?;

    let idle = IdleStrategy::Sleep(Duration::from_millis(1));
    let started = Instant::now();
    while ws.state() != State::Closed {
        if ws.is_open() && started.elapsed() > Duration::from_secs(1) {
            ws.close(CloseCode::Normal, "bye")?;
        }
        ws.poll()?;
        idle.idle(0);
    }

    Ok(())
}
