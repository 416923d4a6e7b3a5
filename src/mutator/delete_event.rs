use super::location_matcher::LocationMatcher;
use super::{EventStream, Mutator, PipelineEnv};
use crate::event::EventId;
use crate::session::{Location, LocationTarget};

/// Deletes one or more syscall/resource-lock regions in their entirety,
/// including every event between a matched start and its matching end
/// (`mutator/delete_event.py`).
pub struct DeleteEvent {
    starts: Vec<EventId>,
    matcher: Option<LocationMatcher>,
}

impl DeleteEvent {
    pub fn new(starts: impl IntoIterator<Item = EventId>) -> DeleteEvent {
        DeleteEvent {
            starts: starts.into_iter().collect(),
            matcher: None,
        }
    }
}

impl Mutator for DeleteEvent {
    fn start(&mut self, env: &mut PipelineEnv) {
        let locations = self
            .starts
            .iter()
            .map(|id| Location::before(LocationTarget::Event(*id)));
        self.matcher = Some(LocationMatcher::new(&env.session, locations));
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let matcher = self.matcher.expect("start() must run before process()");
        let mut syscall_depth = 0i32;
        let mut res_depth = 0i32;
        Box::new(input.filter_map(move |event| {
            let matched = matcher.match_event(&event).is_some();
            if matched || syscall_depth > 0 || res_depth > 0 {
                if event.kind.is_syscall_start() {
                    syscall_depth += 1;
                } else if event.kind.is_resource_lock() {
                    res_depth += 1;
                } else if event.kind.is_syscall_end() {
                    syscall_depth -= 1;
                } else if event.kind.is_resource_unlock() {
                    res_depth -= 1;
                }
                None
            } else {
                Some(event)
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::session::Session;
    use std::rc::Rc;

    /// Deleting a syscall-start drops every event up to and including its
    /// matching `SyscallEnd`, leaving events outside the region untouched.
    #[test]
    fn deletes_whole_syscall_region() {
        let raw = vec![
            EventKind::Pid(1),
            EventKind::Fence,
            EventKind::SyscallExtra { nr: 0, ret: 0, args: Vec::new() },
            EventKind::Fence,
            EventKind::SyscallEnd,
            EventKind::Rdtsc,
        ];
        let session = Rc::new(Session::from_raw_events(raw));
        let events: Vec<EventId> = (0..5).map(|i| session.processes[&1].events.get(i).unwrap()).collect();
        let [before, start, inner, end, after] = [events[0], events[1], events[2], events[3], events[4]];

        let mut env = PipelineEnv::new(Rc::clone(&session));
        let mut mutator: Box<dyn Mutator> = Box::new(DeleteEvent::new(vec![start]));
        mutator.start(&mut env);

        let source: EventStream = Box::new(
            vec![before, start, inner, end, after]
                .into_iter()
                .map(|id| StreamEvent::from_session(session.kind(id).clone(), Some(1), id)),
        );
        let out: Vec<StreamEvent> = mutator.process(source).collect();
        let remaining: Vec<Option<EventId>> = out.iter().map(|e| e.source).collect();
        assert_eq!(remaining, vec![Some(before), Some(after)]);
    }
}
