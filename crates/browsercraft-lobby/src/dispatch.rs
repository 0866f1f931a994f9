//! Fan-out of encoded frames to a lobby's connections.
//!
//! A message is encoded once into a shared [`Frame`] and offered to every
//! connection's outbound queue with `try_send`, so the caller (the lobby's
//! tick) never waits on a slow socket.

use std::sync::Arc;

use browsercraft_protocol::{ChatLine, Codec, LobbyId, ProtocolError, ServerMessage};
use browsercraft_session::{ConnectionRegistry, Frame, OutboundTx};
use browsercraft_transport::ConnectionId;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Outcome of offering one frame to a set of connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Connections whose queue was full. The frame is skipped for them only.
    pub dropped: usize,
    /// Connections whose queue is closed, in id order. The caller runs the
    /// disconnect path for each.
    pub failed: Vec<ConnectionId>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.dropped == 0 && self.failed.is_empty()
    }
}

enum Offer {
    Delivered,
    Dropped,
    Failed,
}

/// Encodes server messages and queues them for a lobby's connections.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher<C: Codec> {
    codec: C,
    lobby_id: LobbyId,
    frames_dropped: u64,
}

impl<C: Codec> BroadcastDispatcher<C> {
    pub fn new(codec: C, lobby_id: LobbyId) -> Self {
        Self {
            codec,
            lobby_id,
            frames_dropped: 0,
        }
    }

    /// Sends a `state-update` to every registered connection.
    ///
    /// # Errors
    /// [`ProtocolError::Encode`] if the snapshot can't be encoded. Nothing is
    /// sent in that case.
    pub fn broadcast_state<S: Serialize>(
        &mut self,
        registry: &ConnectionRegistry,
        tick: u64,
        snapshot: &S,
    ) -> Result<DispatchReport, ProtocolError> {
        let frame = self.encode(&ServerMessage::StateUpdate {
            tick,
            state: snapshot,
        })?;
        Ok(self.fan_out(registry, &frame))
    }

    /// Relays a chat line to every registered connection.
    ///
    /// # Errors
    /// [`ProtocolError::Encode`] if the line can't be encoded.
    pub fn relay_chat(
        &mut self,
        registry: &ConnectionRegistry,
        line: &ChatLine,
    ) -> Result<DispatchReport, ProtocolError> {
        let frame = self.encode(&ServerMessage::<()>::Chat(line.clone()))?;
        Ok(self.fan_out(registry, &frame))
    }

    /// Sends one message to one connection. An unknown connection yields an
    /// empty report.
    ///
    /// # Errors
    /// [`ProtocolError::Encode`] if the message can't be encoded.
    pub fn send_to<S: Serialize>(
        &mut self,
        registry: &ConnectionRegistry,
        connection: ConnectionId,
        message: &ServerMessage<S>,
    ) -> Result<DispatchReport, ProtocolError> {
        let mut report = DispatchReport::default();
        let Some(handle) = registry.get(connection) else {
            return Ok(report);
        };
        let frame = self.encode(message)?;
        self.record(&mut report, connection, handle.outbound(), &frame);
        Ok(report)
    }

    /// Total frames skipped because a queue was full.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Encodes a message for a caller that delivers it itself.
    pub fn encode_message<S: Serialize>(
        &self,
        message: &ServerMessage<S>,
    ) -> Result<Frame, ProtocolError> {
        self.encode(message)
    }

    fn encode<T: Serialize>(&self, message: &T) -> Result<Frame, ProtocolError> {
        self.codec.encode(message).map(Frame::from)
    }

    fn fan_out(&mut self, registry: &ConnectionRegistry, frame: &Frame) -> DispatchReport {
        let mut report = DispatchReport::default();
        for handle in registry.connections() {
            self.record(&mut report, handle.id(), handle.outbound(), frame);
        }
        report.failed.sort_unstable();
        report
    }

    fn record(
        &mut self,
        report: &mut DispatchReport,
        connection: ConnectionId,
        outbound: &OutboundTx,
        frame: &Frame,
    ) {
        match offer(outbound, frame) {
            Offer::Delivered => report.delivered += 1,
            Offer::Dropped => {
                report.dropped += 1;
                self.frames_dropped += 1;
                debug!(
                    lobby_id = %self.lobby_id,
                    conn_id = %connection,
                    "outbound queue full, frame dropped"
                );
            }
            Offer::Failed => {
                debug!(lobby_id = %self.lobby_id, conn_id = %connection, "outbound queue closed");
                report.failed.push(connection);
            }
        }
    }
}

fn offer(outbound: &OutboundTx, frame: &Frame) -> Offer {
    match outbound.try_send(Arc::clone(frame)) {
        Ok(()) => Offer::Delivered,
        Err(TrySendError::Full(_)) => Offer::Dropped,
        Err(TrySendError::Closed(_)) => Offer::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browsercraft_protocol::{JsonCodec, PlayerId};
    use serde_json::Value;
    use tokio::sync::mpsc;

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn dispatcher() -> BroadcastDispatcher<JsonCodec> {
        BroadcastDispatcher::new(JsonCodec, LobbyId(1))
    }

    fn decode(frame: &Frame) -> Value {
        serde_json::from_slice(frame).unwrap()
    }

    #[test]
    fn test_broadcast_reaches_every_connection_with_one_shared_frame() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        registry.register(conn(1), tx1);
        registry.register(conn(2), tx2);

        let report = dispatcher()
            .broadcast_state(&registry, 7, &serde_json::json!({"players": []}))
            .unwrap();
        assert_eq!(report.delivered, 2);
        assert!(report.is_clean());

        let a = rx1.try_recv().unwrap();
        let b = rx2.try_recv().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let value = decode(&a);
        assert_eq!(value["event"], "state-update");
        assert_eq!(value["data"]["tick"], 7);
    }

    #[test]
    fn test_closed_and_full_queues_do_not_stop_delivery() {
        let mut registry = ConnectionRegistry::new();

        let (closed_tx, closed_rx) = mpsc::channel(4);
        drop(closed_rx);
        let (full_tx, mut full_rx) = mpsc::channel(1);
        full_tx.try_send(Frame::from(&b"old"[..])).unwrap();
        let (ok_tx, mut ok_rx) = mpsc::channel(4);

        registry.register(conn(1), closed_tx);
        registry.register(conn(2), full_tx);
        registry.register(conn(3), ok_tx);

        let mut dispatcher = dispatcher();
        let report = dispatcher.broadcast_state(&registry, 1, &()).unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.failed, vec![conn(1)]);
        assert_eq!(dispatcher.frames_dropped(), 1);

        assert_eq!(&*full_rx.try_recv().unwrap(), b"old");
        assert!(full_rx.try_recv().is_err());
        assert_eq!(decode(&ok_rx.try_recv().unwrap())["event"], "state-update");
    }

    #[test]
    fn test_relay_chat_wire_shape() {
        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(conn(1), tx);

        let line = ChatLine {
            name: "Ada".into(),
            message: "hi".into(),
            order: 1,
        };
        dispatcher().relay_chat(&registry, &line).unwrap();

        let value = decode(&rx.try_recv().unwrap());
        assert_eq!(value["event"], "chat-server-to-clients");
        assert_eq!(value["data"]["name"], "Ada");
        assert_eq!(value["data"]["message"], "hi");
        assert_eq!(value["data"]["order"], 1);
    }

    #[test]
    fn test_send_to_targets_one_connection() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        registry.register(conn(1), tx1);
        registry.register(conn(2), tx2);

        let ack = ServerMessage::<()>::JoinAck {
            player_id: PlayerId(1),
            lobby_id: LobbyId(1),
        };
        let report = dispatcher().send_to(&registry, conn(1), &ack).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(decode(&rx1.try_recv().unwrap())["data"]["playerId"], 1);
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_send_to_unknown_connection_is_empty_report() {
        let registry = ConnectionRegistry::new();
        let report = dispatcher()
            .send_to(&registry, conn(9), &ServerMessage::<()>::Error {
                code: 400,
                message: "nope".into(),
            })
            .unwrap();
        assert_eq!(report, DispatchReport::default());
    }
}
