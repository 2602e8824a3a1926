//! Runs both sides against `tungstenite`.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tinyws::stream::tcp::TcpSocket;
use tinyws::ws::{CloseCode, Config, MessageType, State, Websocket, WebsocketEvent, WebsocketServer};
use tungstenite::Message as TungsteniteMessage;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn poll_until<F>(ws: &mut Websocket<TcpSocket>, mut done: F) -> anyhow::Result<()>
where
    F: FnMut(&Websocket<TcpSocket>) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(ws) {
        anyhow::ensure!(Instant::now() < deadline, "condition not met in time");
        ws.poll()?;
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

#[test]
fn should_serve_tungstenite_client() -> anyhow::Result<()> {
    init_logger();
    let mut server = WebsocketServer::bind("127.0.0.1:0".parse()?, Config::default())?;
    let addr = server.get_ref().local_addr()?;

    let server = thread::spawn(move || -> anyhow::Result<Option<CloseCode>> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut ws = loop {
            anyhow::ensure!(Instant::now() < deadline, "no client connected");
            match server.accept()? {
                Some(ws) => break ws,
                None => thread::sleep(Duration::from_millis(1)),
            }
        };
        ws.on_message(|ws, message| {
            let _ = match message.kind() {
                MessageType::Text => ws.send_text(message.as_text().unwrap_or_default()),
                _ => ws.send_binary(message.data()),
            };
        });
        while ws.state() != State::Closed {
            ws.poll()?;
            thread::sleep(Duration::from_millis(1));
        }
        Ok(ws.close_reason().map(|reason| reason.code))
    });

    let (mut client, response) = tungstenite::connect(format!("ws://{addr}/interop"))?;
    assert_eq!(101, response.status().as_u16());

    client.send(TungsteniteMessage::text("interop"))?;
    assert_eq!("interop", client.read()?.to_text()?);

    client.send(TungsteniteMessage::binary(vec![0u8; 70_000]))?;
    let echoed = client.read()?;
    assert!(echoed.is_binary());
    assert_eq!(70_000, echoed.into_data().len());

    client.send(TungsteniteMessage::Ping(b"tick".to_vec().into()))?;
    match client.read()? {
        TungsteniteMessage::Pong(data) => assert_eq!(b"tick", &data[..]),
        other => panic!("expected pong, got {other:?}"),
    }

    client.close(None)?;
    loop {
        match client.read() {
            Ok(_) => continue,
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => break,
            Err(err) => return Err(err.into()),
        }
    }

    let code = server.join().expect("server thread panicked")?;
    assert_eq!(Some(CloseCode::NoStatusReceived), code);
    Ok(())
}

#[test]
fn should_talk_to_tungstenite_server() -> anyhow::Result<()> {
    init_logger();
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let server = thread::spawn(move || -> anyhow::Result<Option<u16>> {
        let (stream, _) = listener.accept()?;
        let mut ws = tungstenite::accept(stream).map_err(|err| anyhow::anyhow!("{err}"))?;
        let mut close_code = None;
        loop {
            match ws.read() {
                Ok(message) if message.is_text() || message.is_binary() => ws.send(message)?,
                Ok(TungsteniteMessage::Close(frame)) => close_code = frame.map(|frame| u16::from(frame.code)),
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(close_code)
    });

    let mut ws = Websocket::connect(&format!("ws://{addr}/"), Config::default().with_max_frame_size(100))?;
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    ws.on_message(move |_, message| sink.lock().unwrap().push(message));
    let pongs = Arc::new(Mutex::new(0usize));
    let sink = pongs.clone();
    ws.on_event(move |_, event| {
        if let WebsocketEvent::Pong(_) = event {
            *sink.lock().unwrap() += 1;
        }
    });

    let text = "fragmented by the client, reassembled by tungstenite ".repeat(10);
    ws.send_text(&text)?;
    ws.start_stream(MessageType::Binary, b"one ")?;
    ws.continue_stream(b"two ")?;
    ws.end_stream(b"three")?;
    ws.ping(b"?")?;
    poll_until(&mut ws, |_| received.lock().unwrap().len() == 2 && *pongs.lock().unwrap() == 1)?;

    {
        let received = received.lock().unwrap();
        assert_eq!(Some(text.as_str()), received[0].as_text());
        assert_eq!(b"one two three", received[1].data());
    }

    ws.close(CloseCode::Normal, "done")?;
    poll_until(&mut ws, |ws| ws.state() == State::Closed)?;
    assert_eq!(Some(CloseCode::Normal), ws.close_reason().map(|reason| reason.code));

    assert_eq!(Some(1000), server.join().expect("server thread panicked")?);
    Ok(())
}
