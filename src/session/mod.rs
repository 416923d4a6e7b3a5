//! Session model: a raw event buffer parsed into processes plus a flat
//! event list (spec.md §3 "Session").

pub mod arena;
pub mod event_list;
pub mod location;
pub mod process;

pub use arena::{EventArena, EventRecord};
pub use event_list::EventList;
pub use location::{Anchor, Location, LocationTarget};
pub use process::Process;

use crate::error::SessionError;
use crate::event::{codec, EventId, EventKind};
use libc::pid_t;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// A mapping pid -> Process plus the full flat event list (spec.md §3
/// "Session"). `processes` is a `BTreeMap` so pid-sorted iteration (used by
/// `CatSession` and `InsertEoqEvents`) is free.
#[derive(Debug, Default)]
pub struct Session {
    pub arena: EventArena,
    pub processes: BTreeMap<pid_t, Process>,
    pub events: EventList,
    current_proc: Option<pid_t>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Build a `Session` by scanning a raw event stream: `Pid` events
    /// switch the current process; all other events append to it
    /// (spec.md §3 "Session... Built by scanning a raw event stream").
    pub fn from_raw_events(raw: impl IntoIterator<Item = EventKind>) -> Session {
        let mut session = Session::new();
        for kind in raw {
            session.add_event(kind);
        }
        session
    }

    fn add_event(&mut self, kind: EventKind) {
        if let EventKind::Pid(pid) = kind {
            self.processes.entry(pid).or_insert_with(|| Process::new(pid));
            self.current_proc = Some(pid);
            let id = self.arena.push(EventKind::Pid(pid));
            self.events.append(&mut self.arena, id);
            return;
        }

        let id = self.arena.push(kind);
        self.events.append(&mut self.arena, id);

        if let Some(pid) = self.current_proc {
            let proc = self.processes.get_mut(&pid).expect("current_proc tracked");
            proc.add_event(&mut self.arena, id);
        }
    }

    /// Load and parse a trace log via memory-mapped read (spec.md §6
    /// "Input format... consumed via memory-mapped read").
    pub fn load(path: &Path) -> Result<Session, SessionError> {
        let file = File::open(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let events = codec::decode_all(&mmap)?;
        Ok(Session::from_raw_events(events))
    }

    pub fn init_proc(&self) -> &Process {
        self.processes.get(&1).expect("init process (pid 1) must exist")
    }

    pub fn kind(&self, id: EventId) -> &EventKind {
        &self.arena.get(id).kind
    }

    pub fn proc_of(&self, id: EventId) -> Option<pid_t> {
        self.arena.get(id).proc
    }

    pub fn syscall_of(&self, id: EventId) -> Option<EventId> {
        self.arena.get(id).syscall
    }

    /// The next event after `id` in its owning process's event list, or
    /// `None` if `id` is the last event of its process (spec.md §3
    /// "Event.next_event").
    pub fn next_event(&self, id: EventId) -> Option<EventId> {
        let pid = self.proc_of(id)?;
        self.processes[&pid].events.after(&self.arena, id).next()
    }

    /// Events between a syscall-start and its matching syscall-end
    /// (spec.md §3 "Event.children").
    pub fn children(&self, syscall_start: EventId) -> Vec<EventId> {
        let pid = match self.proc_of(syscall_start) {
            Some(p) => p,
            None => return Vec::new(),
        };
        process::children_of(&self.arena, &self.processes[&pid].events, syscall_start).collect()
    }

    /// Index of `id` within its owning process's syscall list
    /// (spec.md §3 "Event.syscall_index").
    pub fn syscall_index(&self, id: EventId) -> Option<usize> {
        let pid = self.proc_of(id)?;
        self.processes[&pid].syscalls.index_of(&self.arena, id)
    }

    /// Index of `id` within its owning process's event list
    /// (spec.md §3 "Event.index").
    pub fn index(&self, id: EventId) -> Option<usize> {
        let pid = self.proc_of(id)?;
        self.processes[&pid].events.index_of(&self.arena, id)
    }
}
