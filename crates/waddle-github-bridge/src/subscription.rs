//! Per-room event subscriptions.
//!
//! A [`SubscriptionTable`] is an immutable value. Changes produce a new
//! table which the owning service swaps in whole, so a routing pass never
//! sees a half-applied update.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Room id → set of event types the room wants to hear about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionTable {
    rooms: HashMap<String, BTreeSet<String>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every room in the table, in no particular order.
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Event types a room is subscribed to, if the room is present.
    pub fn event_types(&self, room_id: &str) -> Option<&BTreeSet<String>> {
        self.rooms.get(room_id)
    }

    pub fn is_subscribed(&self, room_id: &str, event_type: &str) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|types| types.contains(event_type))
    }

    /// Rooms that should receive an event of `event_type`.
    pub fn rooms_for<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rooms
            .iter()
            .filter(move |(_, types)| types.contains(event_type))
            .map(|(room, _)| room.as_str())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Replace a room's subscription set.
    pub fn with_room<I, S>(mut self, room_id: impl Into<String>, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rooms.insert(
            room_id.into(),
            event_types.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn without_room(mut self, room_id: &str) -> Self {
        self.rooms.remove(room_id);
        self
    }

    /// Add one event type to a room, creating the room if needed.
    pub fn with_event_type(mut self, room_id: &str, event_type: impl Into<String>) -> Self {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(event_type.into());
        self
    }

    /// Remove one event type from a room. The room stays in the table.
    pub fn without_event_type(mut self, room_id: &str, event_type: &str) -> Self {
        if let Some(types) = self.rooms.get_mut(room_id) {
            types.remove(event_type);
        }
        self
    }
}

impl<R, I, S> FromIterator<(R, I)> for SubscriptionTable
where
    R: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (R, I)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::new(), |table, (room, types)| table.with_room(room, types))
    }
}
