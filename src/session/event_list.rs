use super::arena::{EventArena, EventRecord};
use crate::event::EventId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

/// Ordered sequence of `EventId`s with O(1) indexed lookup (spec.md §3
/// "EventList"). Each member event records its position in *this* list on
/// its arena record's owner-map, so `index_of` never scans.
#[derive(Debug)]
pub struct EventList {
    id: u64,
    items: Vec<EventId>,
}

impl EventList {
    pub fn new() -> EventList {
        EventList {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn append(&mut self, arena: &mut EventArena, e: EventId) {
        let pos = self.items.len();
        self.items.push(e);
        owner_map_mut(arena, e).insert(self.id, pos);
    }

    pub fn get(&self, i: usize) -> Option<EventId> {
        self.items.get(i).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = EventId> + '_ {
        self.items.iter().copied()
    }

    pub fn index_of(&self, arena: &EventArena, e: EventId) -> Option<usize> {
        owner_map(arena, e).get(&self.id).copied()
    }

    /// Events strictly after `e` in this list, in order. O(1) to locate
    /// the start point via the owner-map.
    pub fn after<'a>(&'a self, arena: &'a EventArena, e: EventId) -> impl Iterator<Item = EventId> + 'a {
        let start = self.index_of(arena, e).map(|i| i + 1).unwrap_or(self.items.len());
        self.items[start..].iter().copied()
    }

    /// Events strictly before `e`, nearest first.
    pub fn before<'a>(&'a self, arena: &'a EventArena, e: EventId) -> impl Iterator<Item = EventId> + 'a {
        let end = self.index_of(arena, e).unwrap_or(0);
        self.items[..end].iter().rev().copied()
    }

    /// Re-sort by a key derived from each event's arena record, then
    /// rebuild the owner-map for this list (spec.md §3 "Re-sorts
    /// invalidate and rebuild these maps").
    pub fn sort_by_key<F, K>(&mut self, arena: &mut EventArena, mut key_fn: F)
    where
        F: FnMut(&EventRecord) -> K,
        K: Ord,
    {
        self.items.sort_by_key(|id| key_fn(arena.get(*id)));
        for (pos, id) in self.items.iter().enumerate() {
            owner_map_mut(arena, *id).insert(self.id, pos);
        }
    }
}

impl Default for EventList {
    fn default() -> Self {
        EventList::new()
    }
}

fn owner_map(arena: &EventArena, e: EventId) -> &HashMap<u64, usize> {
    &arena.get(e).owners
}

fn owner_map_mut(arena: &mut EventArena, e: EventId) -> &mut HashMap<u64, usize> {
    &mut arena.get_mut(e).owners
}
