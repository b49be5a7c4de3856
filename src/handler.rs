//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, the
//! registration handshake, and bidirectional traffic between the socket
//! and the Relay actor.
//!
//! Per-connection state machine: Accepted -> Registering -> Active ->
//! Closed. A connection becomes addressable only after its first decoded
//! Message registers a username; the directory entry is removed before the
//! transport closes.

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::message::Message;
use crate::relay::RelayCommand;
use crate::types::{ConnectionId, Username};

/// Channel buffer between the relay and one connection's write task
const PEER_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, waits for the registration message,
/// then runs the connection's read and write tasks until the client leaves,
/// the transport drops, or the relay broadcasts shutdown.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<RelayCommand>,
) -> Result<(), RelayError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let conn_id = ConnectionId::new();

    debug!("New TCP connection {} from {}", conn_id, peer_addr);

    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Registering: exactly one decoded Message binds the username. Nothing
    // from this connection is routed before that.
    let Some(registration) = read_handshake(&mut ws_receiver).await else {
        debug!("Connection {} closed before registering", conn_id);
        return Ok(());
    };
    if registration.from.is_empty() {
        warn!("Connection {} sent a handshake without a username", conn_id);
        return Ok(());
    }
    let username = Username::new(registration.from);

    // Channel the relay uses to reach this connection
    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(PEER_BUFFER_SIZE);

    // Spawn the write task (Message -> WebSocket) before registering so a
    // rejection notice still gets flushed. The task owns the sink and closes
    // it once every sender is gone.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(WsMessage::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    let (reply_tx, reply_rx) = oneshot::channel();
    if cmd_tx
        .send(RelayCommand::Register {
            username: username.clone(),
            sender: msg_tx,
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        // The command owned our sender; its drop lets the write task close
        error!("Failed to register '{}' - relay closed", username);
        let _ = write_task.await;
        return Err(RelayError::ChannelSend);
    }

    if !reply_rx.await.unwrap_or(false) {
        // Name taken: the relay queued a notice on our channel and dropped
        // the sender, so the write task flushes it and closes the socket.
        let _ = write_task.await;
        debug!("Connection {} rejected, username '{}' taken", conn_id, username);
        return Ok(());
    }

    info!("Connection {} registered as '{}' ({})", conn_id, username, peer_addr);

    // Active: decode -> classify -> act
    let cmd_tx_read = cmd_tx.clone();
    let read_username = username.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(frame) = ws_receiver.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<Message>(&text) {
                    Ok(message) => {
                        if message.is_blank() {
                            // Artifact of a closing encoder, not a real event
                            debug!("Ignoring blank record from '{}'", read_username);
                            continue;
                        }
                        if message.is_exit() {
                            debug!("'{}' sent EXIT", read_username);
                            break;
                        }
                        if cmd_tx_read
                            .send(RelayCommand::Route { message })
                            .await
                            .is_err()
                        {
                            debug!("Relay closed, ending read task for '{}'", read_username);
                            break;
                        }
                    }
                    Err(e) => {
                        // Malformed records are a no-op, not a disconnect
                        warn!("Invalid JSON from '{}': {}", read_username, e);
                    }
                },
                Ok(WsMessage::Close(_)) => {
                    debug!("'{}' sent close frame", read_username);
                    break;
                }
                Ok(_) => {
                    // Binary, ping, pong - ignore
                }
                Err(e) => {
                    debug!("WebSocket error for '{}': {}", read_username, e);
                    break;
                }
            }
        }
        debug!("Read task ended for '{}'", read_username);
    });

    // Wait for either task to complete
    let mut writer_done = false;
    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for '{}'", username);
        }
        _ = &mut write_task => {
            debug!("Write task completed for '{}'", username);
            writer_done = true;
        }
    }

    // Removal precedes the socket close: dropping the directory entry drops
    // this connection's sender, which lets the write task drain and close
    // the stream. Ignored if the relay already shut down.
    let _ = cmd_tx
        .send(RelayCommand::Remove {
            username: username.clone(),
        })
        .await;

    // Don't report this connection done until its socket has flushed and
    // closed. The reader is left to finish on its own if the peer stalls.
    if !writer_done {
        let _ = write_task.await;
    }

    info!("'{}' disconnected", username);

    Ok(())
}

/// Read frames until the first one that decodes to a Message
///
/// Returns None if the peer closes, errors, or sends an undecodable text
/// frame before completing the handshake.
async fn read_handshake(
    ws_receiver: &mut SplitStream<WebSocketStream<TcpStream>>,
) -> Option<Message> {
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}
