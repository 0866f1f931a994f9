//! Input intake: the latest intent per player, drained once per tick.

use std::collections::HashMap;
use std::sync::Arc;

use browsercraft_protocol::{PlayerId, RawIntent};
use browsercraft_transport::ConnectionId;

use crate::{ConnectionRegistry, InputIntent, IntakeError, MalformedIntent};

/// One player's input for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub connection: ConnectionId,
    pub name: Arc<str>,
    pub intent: InputIntent,
}

/// Every bound player's intent for one tick, in player-id order.
///
/// The frame is also the tick's roster: a player is in the world exactly
/// when it has an entry here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputFrame {
    entries: Vec<PlayerInput>,
}

impl InputFrame {
    /// Builds a frame from arbitrary entries. Entries are sorted by player
    /// id; if a player appears more than once the last entry wins.
    pub fn new(entries: impl IntoIterator<Item = PlayerInput>) -> Self {
        let mut entries: Vec<PlayerInput> = entries.into_iter().collect();
        // Stable sort keeps submission order among duplicates.
        entries.sort_by_key(|e| e.player_id);
        let mut deduped: Vec<PlayerInput> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.player_id == entry.player_id => *last = entry,
                _ => deduped.push(entry),
            }
        }
        Self { entries: deduped }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlayerInput> {
        self.entries.iter()
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&PlayerInput> {
        self.entries
            .binary_search_by_key(&player_id, |e| e.player_id)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.get(player_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a InputFrame {
    type Item = &'a PlayerInput;
    type IntoIter = std::slice::Iter<'a, PlayerInput>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Pending intents, at most one per player.
///
/// Submissions overwrite: only the most recent intent since the last drain
/// survives. The client timestamp plays no part in that choice.
#[derive(Debug, Default)]
pub struct InputIntake {
    pending: HashMap<PlayerId, InputIntent>,
    /// Intents overwritten before a drain picked them up.
    overwritten: u64,
}

impl InputIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes and stores a raw intent for the player owning `connection`.
    ///
    /// Returns what sanitizing had to discard; the intent is stored either way.
    ///
    /// # Errors
    /// [`IntakeError::UnknownConnection`] if the connection owns no player.
    pub fn submit(
        &mut self,
        registry: &ConnectionRegistry,
        connection: ConnectionId,
        raw: &RawIntent,
    ) -> Result<MalformedIntent, IntakeError> {
        let (intent, malformed) = InputIntent::sanitize(raw);
        if !malformed.is_empty() {
            tracing::debug!(conn_id = %connection, ?malformed, "malformed intent sanitized");
        }
        self.submit_intent(registry, connection, intent)?;
        Ok(malformed)
    }

    /// Stores an already-sanitized intent.
    ///
    /// # Errors
    /// [`IntakeError::UnknownConnection`] if the connection owns no player.
    pub fn submit_intent(
        &mut self,
        registry: &ConnectionRegistry,
        connection: ConnectionId,
        intent: InputIntent,
    ) -> Result<(), IntakeError> {
        let player_id = registry
            .player_of(connection)
            .ok_or(IntakeError::UnknownConnection(connection))?;
        if self.pending.insert(player_id, intent).is_some() {
            self.overwritten += 1;
        }
        Ok(())
    }

    /// Takes every pending intent and builds the tick's input frame.
    ///
    /// Each player currently bound in `registry` gets exactly one entry: its
    /// pending intent, or the neutral intent if it sent nothing. Pending
    /// intents of players no longer bound are discarded. Afterwards nothing
    /// is pending.
    pub fn drain_all(&mut self, registry: &ConnectionRegistry) -> InputFrame {
        let mut pending = std::mem::take(&mut self.pending);
        let entries = registry
            .bindings()
            .map(|(connection, binding)| PlayerInput {
                player_id: binding.player_id,
                connection,
                name: Arc::clone(&binding.name),
                intent: pending.remove(&binding.player_id).unwrap_or_default(),
            })
            .collect();
        if !pending.is_empty() {
            tracing::trace!(stale = pending.len(), "discarded intents of departed players");
        }
        // `bindings()` is already in player-id order.
        InputFrame { entries }
    }

    /// Drops the pending intent for a departing player.
    pub fn forget(&mut self, player_id: PlayerId) {
        self.pending.remove(&player_id);
    }

    /// Number of players with an intent waiting for the next drain.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total intents replaced by a newer one before being drained.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}
