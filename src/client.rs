//! Interactive command-line client
//!
//! Connects to a relay, registers a username, then runs a stdin loop.
//! Input lines are `<recipient> <message...>` pairs; the `EXIT` token (or
//! Ctrl-C) leaves the chat room gracefully. Received messages are printed
//! as they arrive.

use std::io::Write;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::RelayError;
use crate::message::{Message, EXIT_TOKEN};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Run the client until the user leaves or the server goes away
pub async fn run(addr: &str, username: &str) -> Result<(), RelayError> {
    let (ws_stream, _) = connect_async(format!("ws://{}", addr)).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    print_banner(addr, username);

    // Registration handshake: bind our username to this connection
    send_message(&mut ws_sender, &Message::registration(username)).await?;

    // Printer task for incoming messages; ends on the server's shutdown
    // notice or when the connection drops.
    let mut read_task = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    let Ok(message) = serde_json::from_str::<Message>(&text) else {
                        continue;
                    };
                    if message.is_blank() {
                        continue;
                    }
                    if message.is_shutdown_notice() {
                        println!("\rServer closed the chat room.");
                        return;
                    }
                    print_incoming(&message);
                }
                Ok(WsMessage::Close(_)) | Err(_) => return,
                Ok(_) => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();

        tokio::select! {
            // Server went away; nothing left to send to
            _ = &mut read_task => break,
            // Ctrl-C leaves gracefully, same as typing EXIT
            _ = tokio::signal::ctrl_c() => {
                send_message(&mut ws_sender, &Message::leave(username)).await?;
                break;
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };

                if line.trim() == EXIT_TOKEN {
                    println!("Leaving the chat room...");
                    send_message(&mut ws_sender, &Message::leave(username)).await?;
                    break;
                }

                match parse_outgoing(username, &line) {
                    Some(message) => send_message(&mut ws_sender, &message).await?,
                    None => println!("Invalid input, expected: {{recipient}} {{message}}"),
                }
            }
        }
    }

    let _ = ws_sender.close().await;

    Ok(())
}

/// Serialize and send one message
async fn send_message(ws_sender: &mut WsSink, message: &Message) -> Result<(), RelayError> {
    let json = serde_json::to_string(message)?;
    ws_sender.send(WsMessage::Text(json.into())).await?;
    Ok(())
}

/// Parse an input line as `<recipient> <message...>`
///
/// The body keeps its internal spacing. Returns None when there is no
/// recipient or no body.
fn parse_outgoing(username: &str, line: &str) -> Option<Message> {
    let (to, content) = line.trim().split_once(' ')?;
    let content = content.trim();
    if to.is_empty() || content.is_empty() {
        return None;
    }
    Some(Message::new(to, username, content))
}

fn print_banner(addr: &str, username: &str) {
    println!("----------------------");
    println!("Chatroom Server: {}", addr);
    println!("Username:        {}", username);
    println!("----------------------");
}

fn print_incoming(message: &Message) {
    println!("\r----------------------");
    println!("From:    {}", message.from);
    println!("Content: {}", message.content);
    prompt();
}

fn prompt() {
    print!(">> ");
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_outgoing_keeps_body_spacing() {
        let msg = parse_outgoing("alice", "bob hi there, how are you?").unwrap();
        assert_eq!(msg.to, "bob");
        assert_eq!(msg.from, "alice");
        assert_eq!(msg.content, "hi there, how are you?");
    }

    #[test]
    fn test_parse_outgoing_requires_body() {
        assert!(parse_outgoing("alice", "bob").is_none());
        assert!(parse_outgoing("alice", "bob   ").is_none());
        assert!(parse_outgoing("alice", "").is_none());
        assert!(parse_outgoing("alice", "   ").is_none());
    }
}
