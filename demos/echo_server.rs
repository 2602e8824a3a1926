//! Echo server: `cargo run --example echo_server -- 9001`
use std::time::Duration;

use log::info;
use tinyws::idle::IdleStrategy;
use tinyws::stream::tcp::TcpSocket;
use tinyws::ws::{Config, MessageType, State, Websocket, WebsocketEvent, WebsocketServer};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let port = std::env::args().nth(1).map(|port| port.parse()).transpose()?.unwrap_or(9001);
    let config = Config::default().with_max_message_size(1024 * 1024);
    let mut server = WebsocketServer::listen(port, config)?;
    let mut clients: Vec<Websocket<TcpSocket>> = Vec::new();
    let idle = IdleStrategy::Sleep(Duration::from_millis(1));

    loop {
        let mut work_count = 0;

        match server.accept() {
            Ok(Some(mut ws)) => {
                ws.on_message(|ws, message| {
                    let _ = match message.kind() {
                        MessageType::Text => ws.send_text(message.as_text().unwrap_or_default()),
                        _ => ws.send_binary(message.data()),
                    };
                });
                ws.on_event(|ws, event| match event {
                    WebsocketEvent::Opened => info!("client connected on {}", ws.request_path()),
                    WebsocketEvent::Closed(reason) => info!("client on {} left: {reason}", ws.request_path()),
                    _ => {}
                });
                clients.push(ws);
                work_count += 1;
            }
            Ok(None) => {}
            Err(err) => info!("handshake failed: {err}"),
        }

        for ws in clients.iter_mut() {
            // errors are reported through the closed event
            let _ = ws.poll();
        }
        clients.retain(|ws| ws.state() != State::Closed);

        idle.idle(work_count);
    }
}
