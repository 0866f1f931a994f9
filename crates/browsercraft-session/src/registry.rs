//! The connection registry: which live connection owns which player.
//!
//! One registry per lobby. It is a plain map, not a concurrent one: the
//! lobby actor owns it and every connection event reaches it through the
//! actor's queue, so calls from many connections are serialized there.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use browsercraft_protocol::PlayerId;
use browsercraft_transport::ConnectionId;
use tokio::sync::mpsc;

use crate::RegistryError;

/// An encoded message ready to be written to a socket. Shared, so one
/// encoded broadcast can be queued to every connection without copying.
pub type Frame = Arc<[u8]>;

/// Sending half of a connection's outbound queue.
pub type OutboundTx = mpsc::Sender<Frame>;

/// The player a connection owns once its join succeeded.
#[derive(Debug, Clone)]
pub struct Binding {
    pub player_id: PlayerId,
    /// Display name, shared with every input frame built for this player.
    pub name: Arc<str>,
    pub bound_at: Instant,
}

/// A registered connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    created_at: Instant,
    outbound: OutboundTx,
    binding: Option<Binding>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// `false` once the writer side of the connection has gone away.
    pub fn is_alive(&self) -> bool {
        !self.outbound.is_closed()
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn outbound(&self) -> &OutboundTx {
        &self.outbound
    }
}

/// Maps live connections to their players.
///
/// ```text
/// register() ──→ bind() ──→ unregister()
///      │                        ▲
///      └────────────────────────┘   (unregister is valid at any point,
///                                    any number of times)
/// ```
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// Bound players in id order. Iteration order of this map is the
    /// order players are handed to the simulation.
    players: BTreeMap<PlayerId, ConnectionId>,
    next_player_id: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection with its outbound queue.
    ///
    /// Registering an id that is already present keeps the existing entry
    /// (and its queue) and returns it.
    pub fn register(&mut self, id: ConnectionId, outbound: OutboundTx) -> &ConnectionHandle {
        self.connections.entry(id).or_insert_with(|| {
            tracing::debug!(conn_id = %id, "connection registered");
            ConnectionHandle {
                id,
                created_at: Instant::now(),
                outbound,
                binding: None,
            }
        })
    }

    /// Binds a display name to a registered connection, creating its player.
    ///
    /// # Errors
    /// - [`RegistryError::UnknownConnection`] if `id` isn't registered.
    /// - [`RegistryError::DuplicateBinding`] if it already owns a player;
    ///   nothing changes in that case.
    pub fn bind(&mut self, id: ConnectionId, name: &str) -> Result<&Binding, RegistryError> {
        let handle = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;

        if let Some(existing) = &handle.binding {
            return Err(RegistryError::DuplicateBinding(id, existing.player_id));
        }

        self.next_player_id += 1;
        let player_id = PlayerId(self.next_player_id);
        self.players.insert(player_id, id);

        tracing::info!(conn_id = %id, %player_id, name, "player bound");
        Ok(handle.binding.insert(Binding {
            player_id,
            name: Arc::from(name),
            bound_at: Instant::now(),
        }))
    }

    /// Removes a connection and its player, if any.
    ///
    /// Idempotent: unknown or already-removed ids return `None`.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        let handle = self.connections.remove(&id)?;
        if let Some(binding) = &handle.binding {
            self.players.remove(&binding.player_id);
            tracing::info!(conn_id = %id, player_id = %binding.player_id, "player removed");
        } else {
            tracing::debug!(conn_id = %id, "unbound connection removed");
        }
        Some(handle)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(&id)
    }

    /// The binding for a connection, if it owns a player.
    pub fn binding(&self, id: ConnectionId) -> Option<&Binding> {
        self.connections.get(&id).and_then(|h| h.binding.as_ref())
    }

    pub fn player_of(&self, id: ConnectionId) -> Option<PlayerId> {
        self.binding(id).map(|b| b.player_id)
    }

    pub fn player_name(&self, id: ConnectionId) -> Option<&str> {
        self.binding(id).map(|b| &*b.name)
    }

    pub fn connection_of(&self, player_id: PlayerId) -> Option<ConnectionId> {
        self.players.get(&player_id).copied()
    }

    /// Every bound connection with its binding, in player-id order.
    pub fn bindings(&self) -> impl Iterator<Item = (ConnectionId, &Binding)> + '_ {
        self.players.values().filter_map(|conn| {
            self.connections
                .get(conn)
                .and_then(|h| h.binding.as_ref().map(|b| (*conn, b)))
        })
    }

    /// Every registered connection, bound or not. Order is unspecified.
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionHandle> + '_ {
        self.connections.values()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of connections that own a player.
    pub fn bound_count(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn outbound() -> OutboundTx {
        mpsc::channel(4).0
    }

    #[test]
    fn test_register_then_bind() {
        let mut reg = ConnectionRegistry::new();
        reg.register(conn(1), outbound());
        let binding = reg.bind(conn(1), "Ada").unwrap();
        assert_eq!(&*binding.name, "Ada");
        assert_eq!(reg.player_name(conn(1)), Some("Ada"));
        assert_eq!(reg.bound_count(), 1);
    }

    #[test]
    fn test_bind_unregistered_connection_fails() {
        let mut reg = ConnectionRegistry::new();
        let err = reg.bind(conn(9), "Ada").unwrap_err();
        assert_eq!(err, RegistryError::UnknownConnection(conn(9)));
    }

    #[test]
    fn test_duplicate_bind_is_rejected_and_keeps_original() {
        let mut reg = ConnectionRegistry::new();
        reg.register(conn(1), outbound());
        let original = reg.bind(conn(1), "Ada").unwrap().player_id;

        let err = reg.bind(conn(1), "Mallory").unwrap_err();
        assert_eq!(err, RegistryError::DuplicateBinding(conn(1), original));
        assert_eq!(reg.player_name(conn(1)), Some("Ada"));
        assert_eq!(reg.player_of(conn(1)), Some(original));
        assert_eq!(reg.bound_count(), 1);
    }

    #[test]
    fn test_register_twice_keeps_existing_entry() {
        let mut reg = ConnectionRegistry::new();
        reg.register(conn(1), outbound());
        reg.bind(conn(1), "Ada").unwrap();
        reg.register(conn(1), outbound());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.player_name(conn(1)), Some("Ada"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut reg = ConnectionRegistry::new();
        reg.register(conn(1), outbound());
        reg.bind(conn(1), "Ada").unwrap();

        assert!(reg.unregister(conn(1)).is_some());
        assert!(reg.unregister(conn(1)).is_none());
        assert!(reg.unregister(conn(42)).is_none());
        assert!(reg.is_empty());
        assert_eq!(reg.bound_count(), 0);
    }

    #[test]
    fn test_unregister_without_bind() {
        let mut reg = ConnectionRegistry::new();
        reg.register(conn(1), outbound());
        let handle = reg.unregister(conn(1)).unwrap();
        assert!(handle.binding().is_none());
    }

    #[test]
    fn test_player_ids_are_never_reused() {
        let mut reg = ConnectionRegistry::new();
        reg.register(conn(1), outbound());
        let first = reg.bind(conn(1), "Ada").unwrap().player_id;
        reg.unregister(conn(1));

        reg.register(conn(1), outbound());
        let second = reg.bind(conn(1), "Ada").unwrap().player_id;
        assert_ne!(first, second);
    }

    #[test]
    fn test_bindings_iterate_in_player_order() {
        let mut reg = ConnectionRegistry::new();
        for (c, name) in [(30, "C"), (10, "A"), (20, "B")] {
            reg.register(conn(c), outbound());
            reg.bind(conn(c), name).unwrap();
        }
        let names: Vec<&str> = reg.bindings().map(|(_, b)| &*b.name).collect();
        assert_eq!(names, vec!["C", "A", "B"], "bind order, not connection order");
        let ids: Vec<PlayerId> = reg.bindings().map(|(_, b)| b.player_id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_is_alive_tracks_receiver() {
        let mut reg = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        reg.register(conn(1), tx);
        assert!(reg.get(conn(1)).unwrap().is_alive());
        drop(rx);
        assert!(!reg.get(conn(1)).unwrap().is_alive());
    }
}
