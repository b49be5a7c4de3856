//! Listener loop
//!
//! Accepts connections and spawns a handler per connection, racing each
//! accept against the operator shutdown signal.

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::handler::handle_connection;
use crate::relay::{Relay, RelayCommand};

/// Channel buffer size for relay commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Accept connections until shutdown is requested
///
/// Spawns the Relay actor and one handler task per accepted connection. A
/// shutdown signal makes the relay broadcast its termination notice to
/// every registered client; `run` returns only after that broadcast has
/// been delivered, and dropping the listener stops new connections.
pub async fn run(listener: TcpListener, mut shutdown_rx: mpsc::Receiver<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    tokio::spawn(Relay::new(cmd_rx).run());

    // Completion tracker: every handler task holds a clone of the sender,
    // so recv returns None once the last connection has fully closed.
    let (tracker_tx, mut tracker_rx) = mpsc::channel::<()>(1);

    let mut shutdown_open = true;

    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();
                    let tracker = tracker_tx.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx).await {
                            error!("Connection handler error: {}", e);
                        }
                        drop(tracker);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            maybe = shutdown_rx.recv(), if shutdown_open => match maybe {
                Some(()) => {
                    let (done_tx, done_rx) = oneshot::channel();
                    if cmd_tx.send(RelayCommand::Shutdown { done: done_tx }).await.is_ok() {
                        let _ = done_rx.await;
                    }
                    break;
                }
                None => {
                    // Control surface closed without the token; keep serving
                    shutdown_open = false;
                }
            },
        }
    }

    // Join every connection before returning so sockets close
    // deterministically instead of dying with the process.
    drop(tracker_tx);
    while tracker_rx.recv().await.is_some() {}

    info!("Listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const SETTLE: Duration = Duration::from_millis(200);

    async fn start_server() -> (String, mpsc::Sender<()>, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let server = tokio::spawn(run(listener, shutdown_rx));
        (addr, shutdown_tx, server)
    }

    async fn connect_and_register(addr: &str, username: &str) -> WsClient {
        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        send(&mut ws, &Message::registration(username)).await;
        ws
    }

    async fn send(ws: &mut WsClient, message: &Message) {
        let json = serde_json::to_string(message).unwrap();
        ws.send(WsMessage::Text(json.into())).await.unwrap();
    }

    async fn recv(ws: &mut WsClient) -> Message {
        timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await.expect("stream ended").unwrap() {
                    WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                    _ => continue,
                }
            }
        })
        .await
        .expect("timed out waiting for a message")
    }

    /// Drain a client's stream to its end after the server closes it.
    async fn expect_closed(ws: &mut WsClient) {
        timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) => break,
                    Some(Ok(WsMessage::Close(_))) => continue,
                    Some(Ok(frame)) => panic!("unexpected frame after close: {:?}", frame),
                }
            }
        })
        .await
        .expect("timed out waiting for the connection to close");
    }

    #[tokio::test]
    async fn test_relays_message_between_clients() {
        let (addr, _shutdown_tx, _server) = start_server().await;

        let mut alice = connect_and_register(&addr, "alice").await;
        let mut bob = connect_and_register(&addr, "bob").await;
        sleep(SETTLE).await;

        let sent = Message::new("bob", "alice", "hi bob");
        send(&mut alice, &sent).await;

        let received = recv(&mut bob).await;
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_offline_recipient_notice_reaches_sender() {
        let (addr, _shutdown_tx, _server) = start_server().await;

        let mut alice = connect_and_register(&addr, "alice").await;
        sleep(SETTLE).await;

        send(&mut alice, &Message::new("nobody", "alice", "hello?")).await;

        let notice = recv(&mut alice).await;
        assert_eq!(notice.from, "SERVER");
        assert_eq!(notice.content, "The user \"nobody\" is not online.");
    }

    #[tokio::test]
    async fn test_graceful_leave_removes_registration() {
        let (addr, _shutdown_tx, _server) = start_server().await;

        let mut alice = connect_and_register(&addr, "alice").await;
        let mut bob = connect_and_register(&addr, "bob").await;
        sleep(SETTLE).await;

        send(&mut bob, &Message::leave("bob")).await;
        expect_closed(&mut bob).await;

        send(&mut alice, &Message::new("bob", "alice", "still there?")).await;
        let notice = recv(&mut alice).await;
        assert_eq!(notice.content, "The user \"bob\" is not online.");
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let (addr, _shutdown_tx, _server) = start_server().await;

        let mut first = connect_and_register(&addr, "alice").await;
        sleep(SETTLE).await;
        let mut second = connect_and_register(&addr, "alice").await;

        let notice = recv(&mut second).await;
        assert_eq!(notice.content, "The username \"alice\" is already taken.");
        expect_closed(&mut second).await;

        // The first registration keeps working
        send(&mut first, &Message::new("alice", "alice", "note to self")).await;
        let received = recv(&mut first).await;
        assert_eq!(received.content, "note to self");
    }

    #[tokio::test]
    async fn test_closed_control_surface_does_not_stop_server() {
        let (addr, shutdown_tx, _server) = start_server().await;

        // Operator input reaching EOF is not a shutdown request
        drop(shutdown_tx);
        sleep(SETTLE).await;

        let mut alice = connect_and_register(&addr, "alice").await;
        sleep(SETTLE).await;

        send(&mut alice, &Message::new("nobody", "alice", "ping")).await;
        let notice = recv(&mut alice).await;
        assert_eq!(notice.content, "The user \"nobody\" is not online.");
    }

    #[tokio::test]
    async fn test_shutdown_notifies_clients_and_stops_accepting() {
        let (addr, shutdown_tx, server) = start_server().await;

        let mut alice = connect_and_register(&addr, "alice").await;
        let mut bob = connect_and_register(&addr, "bob").await;
        sleep(SETTLE).await;

        shutdown_tx.send(()).await.unwrap();

        for (name, ws) in [("alice", &mut alice), ("bob", &mut bob)] {
            let notice = recv(ws).await;
            assert_eq!(notice.to, name);
            assert!(notice.is_shutdown_notice());
            expect_closed(ws).await;
        }

        timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap();

        assert!(connect_async(format!("ws://{}", addr)).await.is_err());
    }
}
