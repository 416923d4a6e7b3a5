use super::location_matcher::LocationMatcher;
use super::{EventStream, Mutator, PipelineEnv};
use crate::event::{EventKind, StreamEvent};
use crate::session::Location;

/// Inserts an `IgnoreSyscall` marker at a matched location, without
/// removing the original syscall (`mutator/ignore_syscall.py`).
pub struct IgnoreSyscall {
    location: Location,
    matcher: Option<LocationMatcher>,
}

impl IgnoreSyscall {
    pub fn new(location: Location) -> IgnoreSyscall {
        IgnoreSyscall {
            location,
            matcher: None,
        }
    }
}

impl Mutator for IgnoreSyscall {
    fn start(&mut self, env: &mut PipelineEnv) {
        self.matcher = Some(LocationMatcher::single(&env.session, self.location));
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let matcher = self.matcher.expect("start() must run before process()");
        Box::new(input.flat_map(move |event| {
            let mut out = Vec::new();
            if matcher.match_event(&event).is_some() {
                let proc = event.proc.expect("ignore-syscall target must have an owning process");
                out.push(StreamEvent::synthetic(EventKind::IgnoreSyscall, proc));
            }
            out.push(event);
            out.into_iter()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LocationTarget, Session};
    use std::rc::Rc;

    /// An `IgnoreSyscall` marker is inserted right before the matched
    /// event, which itself still passes through unchanged.
    #[test]
    fn inserts_marker_without_removing_the_original_event() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence, EventKind::Fence];
        let session = Rc::new(Session::from_raw_events(raw));
        let target = session.processes[&1].events.get(1).unwrap();

        let mut env = PipelineEnv::new(Rc::clone(&session));
        let mut mutator: Box<dyn Mutator> =
            Box::new(IgnoreSyscall::new(Location::before(LocationTarget::Event(target))));
        mutator.start(&mut env);

        let first = session.processes[&1].events.get(0).unwrap();
        let source: EventStream = Box::new(
            vec![
                StreamEvent::from_session(EventKind::Fence, Some(1), first),
                StreamEvent::from_session(EventKind::Fence, Some(1), target),
            ]
            .into_iter(),
        );
        let out: Vec<StreamEvent> = mutator.process(source).collect();
        assert_eq!(out.len(), 3);
        assert!(matches!(out[1].kind, EventKind::IgnoreSyscall));
        assert_eq!(out[2].source, Some(target));
    }
}
