//! Per-connection handler: join, message routing, cleanup.
//!
//! Each accepted connection gets two Tokio tasks:
//!   - the reader (this handler) decodes client frames and forwards them
//!     to the player's lobby
//!   - the writer drains the connection's outbound queue into the socket
//!
//! The lobby only ever sees the outbound queue, so a slow socket cannot
//! stall a tick.

use std::sync::Arc;

use browsercraft_lobby::{LobbyHandle, Placement};
use browsercraft_protocol::{ClientMessage, Codec, JoinRequest, ServerMessage};
use browsercraft_session::{
    AccountService, Frame, IdentityError, IdentitySession, OutboundTx, resolve_display_name,
};
use browsercraft_sim::Simulation;
use browsercraft_transport::{
    Connection, ConnectionId, Handshake, PendingWebSocket, WebSocketConnection,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::BrowsercraftError;
use crate::server::ServerState;

/// Removes the connection from its lobby when the handler exits.
///
/// `Drop` is synchronous, so the async leave runs on a spawned task.
struct LobbyGuard<S: Simulation, A: AccountService, I: IdentitySession, C: Codec> {
    connection: ConnectionId,
    state: Arc<ServerState<S, A, I, C>>,
}

impl<S: Simulation, A: AccountService, I: IdentitySession, C: Codec> Drop
    for LobbyGuard<S, A, I, C>
{
    fn drop(&mut self) {
        let connection = self.connection;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut lobbies = state.lobbies.lock().await;
            if let Some(lobby_id) = lobbies.leave(connection).await {
                debug!(%connection, %lobby_id, "left lobby");
            }
        });
    }
}

/// Status code for a failed identity check.
pub(crate) fn identity_error_code(err: &IdentityError) -> u16 {
    match err {
        IdentityError::UnknownSession | IdentityError::InvalidCredentials => 401,
        IdentityError::GuestsNotAllowed => 403,
        IdentityError::MissingName | IdentityError::InvalidName(_) => 400,
    }
}

/// Completes the WebSocket upgrade on the connection's own task, then
/// hands over to [`handle_connection`].
///
/// A peer that never finishes the upgrade is dropped after the handshake
/// timeout without ever reaching a lobby.
pub(crate) async fn serve<S, A, I, C>(
    pending: PendingWebSocket,
    state: Arc<ServerState<S, A, I, C>>,
) -> Result<(), BrowsercraftError>
where
    S: Simulation,
    A: AccountService,
    I: IdentitySession,
    C: Codec,
{
    let addr = pending.peer_addr();
    let conn = match tokio::time::timeout(state.settings.handshake_timeout, pending.complete()).await
    {
        Ok(result) => result?,
        Err(_) => {
            debug!(%addr, "handshake timed out");
            return Ok(());
        }
    };
    handle_connection(conn, state).await
}

/// Handles a single connection from upgrade to close.
pub(crate) async fn handle_connection<S, A, I, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<S, A, I, C>>,
) -> Result<(), BrowsercraftError>
where
    S: Simulation,
    A: AccountService,
    I: IdentitySession,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    debug!(%conn_id, "handling new connection");

    let (outbound, outbound_rx) = mpsc::channel::<Frame>(state.settings.outbound_capacity);
    tokio::spawn(write_frames(Arc::clone(&conn), outbound_rx));

    let _guard = LobbyGuard {
        connection: conn_id,
        state: Arc::clone(&state),
    };
    let mut lobby: Option<LobbyHandle> = None;

    loop {
        let data = match tokio::time::timeout(state.settings.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                debug!(%conn_id, "connection closed by peer");
                break;
            }
            Ok(Err(e)) => {
                debug!(%conn_id, error = %e, "receive failed");
                break;
            }
            Err(_) => {
                info!(%conn_id, "idle timeout");
                break;
            }
        };

        let message: ClientMessage = match state.codec.decode(&data) {
            Ok(message) => message,
            Err(e) => {
                debug!(%conn_id, error = %e, "ignoring undecodable frame");
                continue;
            }
        };

        match message {
            ClientMessage::Join(request) => {
                if let Some(placement) = join(&state, conn_id, &request, &outbound).await {
                    lobby = Some(placement.handle);
                }
            }
            ClientMessage::Action(intent) => match &lobby {
                Some(handle) => {
                    if let Err(e) = handle.input(conn_id, intent).await {
                        warn!(%conn_id, error = %e, "lobby gone, dropping input");
                        lobby = None;
                    }
                }
                None => debug!(%conn_id, "input before join ignored"),
            },
            ClientMessage::Chat(text) => match &lobby {
                Some(handle) => {
                    if let Err(e) = handle.chat(conn_id, text).await {
                        warn!(%conn_id, error = %e, "lobby gone, dropping chat");
                        lobby = None;
                    }
                }
                None => debug!(%conn_id, "chat before join ignored"),
            },
            ClientMessage::Heartbeat { client_time } => {
                let ack = ServerMessage::<()>::HeartbeatAck {
                    client_time,
                    server_time: state.server_time_ms(),
                };
                queue(&state.codec, &outbound, &ack).await?;
            }
            ClientMessage::Disconnect { reason } => {
                info!(%conn_id, %reason, "client disconnected");
                break;
            }
        }
    }

    Ok(())
}

/// Resolves the player's name and places them in a lobby.
///
/// Failures are reported to the client as an error frame.
async fn join<S, A, I, C>(
    state: &ServerState<S, A, I, C>,
    conn_id: ConnectionId,
    request: &JoinRequest,
    outbound: &OutboundTx,
) -> Option<Placement>
where
    S: Simulation,
    A: AccountService,
    I: IdentitySession,
    C: Codec,
{
    let name = match resolve_display_name(
        request,
        &state.accounts,
        &state.identity,
        state.settings.allow_guests,
    )
    .await
    {
        Ok(name) => name,
        Err(e) => {
            info!(%conn_id, error = %e, "join refused");
            send_error(state, outbound, identity_error_code(&e), e.to_string()).await;
            return None;
        }
    };

    let placed = {
        let mut lobbies = state.lobbies.lock().await;
        lobbies.join_or_create(conn_id, &name, outbound.clone()).await
    };

    match placed {
        Ok(placement) => {
            info!(
                %conn_id,
                player_id = %placement.player_id,
                lobby_id = %placement.lobby_id,
                %name,
                "player joined"
            );
            Some(placement)
        }
        Err(e) => {
            info!(%conn_id, error = %e, "join refused");
            send_error(state, outbound, e.code(), e.to_string()).await;
            None
        }
    }
}

async fn send_error<S, A, I, C>(
    state: &ServerState<S, A, I, C>,
    outbound: &OutboundTx,
    code: u16,
    message: String,
) where
    S: Simulation,
    A: AccountService,
    I: IdentitySession,
    C: Codec,
{
    let msg = ServerMessage::<()>::Error { code, message };
    if let Err(e) = queue(&state.codec, outbound, &msg).await {
        debug!(error = %e, "could not queue error frame");
    }
}

/// Encodes a direct reply and queues it behind any pending broadcasts.
async fn queue<C: Codec>(
    codec: &C,
    outbound: &OutboundTx,
    msg: &ServerMessage<()>,
) -> Result<(), BrowsercraftError> {
    let frame: Frame = codec.encode(msg)?.into();
    // A closed queue means the writer already quit; the reader will follow.
    let _ = outbound.send(frame).await;
    Ok(())
}

/// Drains the outbound queue into the socket until every sender is gone
/// or the socket fails.
async fn write_frames(conn: Arc<WebSocketConnection>, mut outbound: mpsc::Receiver<Frame>) {
    let conn_id = conn.id();
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = conn.send(&frame).await {
            debug!(%conn_id, error = %e, "send failed, stopping writer");
            return;
        }
    }
    let _ = conn.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_codes() {
        assert_eq!(identity_error_code(&IdentityError::InvalidCredentials), 401);
        assert_eq!(identity_error_code(&IdentityError::UnknownSession), 401);
        assert_eq!(identity_error_code(&IdentityError::GuestsNotAllowed), 403);
        assert_eq!(identity_error_code(&IdentityError::MissingName), 400);
    }
}
