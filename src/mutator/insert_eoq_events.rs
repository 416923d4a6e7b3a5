use super::{EventStream, Mutator, PipelineEnv};
use crate::event::{EventKind, StreamEvent};
use libc::pid_t;
use std::collections::BTreeMap;

/// Appends a `QueueEof` for every process that didn't end with one
/// (`mutator/insert_eoq_events.py`). Buffers the whole stream since the
/// tail can only be computed once every process has been seen, and emits
/// in pid order so repeated runs are deterministic.
pub struct InsertEoqEvents;

impl InsertEoqEvents {
    pub fn new() -> InsertEoqEvents {
        InsertEoqEvents
    }
}

impl Mutator for InsertEoqEvents {
    fn start(&mut self, _env: &mut PipelineEnv) {}

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let events: Vec<_> = input.collect();
        let mut proc_eoq: BTreeMap<pid_t, bool> = BTreeMap::new();
        for event in &events {
            if let Some(pid) = event.proc {
                proc_eoq.insert(pid, event.kind.is_queue_eof());
            }
        }
        let tail = proc_eoq
            .into_iter()
            .filter(|(_, has_eoq)| !has_eoq)
            .map(|(pid, _)| StreamEvent::synthetic(EventKind::QueueEof, pid));
        Box::new(events.into_iter().chain(tail))
    }
}
