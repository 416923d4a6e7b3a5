use crate::event::{EventId, EventKind};
use libc::pid_t;
use std::collections::HashMap;

/// Per-event bookkeeping kept in the arena, not on the event value itself:
/// which process owns it, which syscall-start (if any) encloses it, and
/// which `EventList`s it's a member of (and at what position).
#[derive(Debug)]
pub struct EventRecord {
    pub kind: EventKind,
    pub proc: Option<pid_t>,
    pub syscall: Option<EventId>,
    pub resource: Option<EventId>,
    pub(crate) owners: HashMap<u64, usize>,
}

/// Owns every event ever parsed into a `Session`, addressed by stable
/// `EventId` handles (spec.md §9: "arena-per-Session with stable integer
/// handles" sidesteps the `event <-> process <-> event-list` cycle that a
/// `Rc`-based graph would otherwise need).
#[derive(Debug, Default)]
pub struct EventArena {
    events: Vec<EventRecord>,
}

impl EventArena {
    pub fn new() -> EventArena {
        EventArena { events: Vec::new() }
    }

    pub fn push(&mut self, kind: EventKind) -> EventId {
        let id = EventId(self.events.len() as u32);
        self.events.push(EventRecord {
            kind,
            proc: None,
            syscall: None,
            resource: None,
            owners: HashMap::new(),
        });
        id
    }

    pub fn get(&self, id: EventId) -> &EventRecord {
        &self.events[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: EventId) -> &mut EventRecord {
        &mut self.events[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
