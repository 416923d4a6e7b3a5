use super::location_matcher::LocationMatcher;
use super::{EventStream, Mutator, PipelineEnv};
use crate::event::EventId;
use crate::session::{Location, LocationTarget};

/// Deletes a single syscall (by its syscall-start event) and every event
/// up to and including its matching `SyscallEnd` (`mutator/delete_syscall.py`).
pub struct DeleteSyscall {
    syscall: EventId,
    matcher: Option<LocationMatcher>,
}

impl DeleteSyscall {
    pub fn new(syscall: EventId) -> DeleteSyscall {
        DeleteSyscall {
            syscall,
            matcher: None,
        }
    }
}

impl Mutator for DeleteSyscall {
    fn start(&mut self, env: &mut PipelineEnv) {
        self.matcher = Some(LocationMatcher::single(
            &env.session,
            Location::before(LocationTarget::Event(self.syscall)),
        ));
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let matcher = self.matcher.expect("start() must run before process()");
        let mut skip = false;
        Box::new(input.filter_map(move |event| {
            if matcher.match_event(&event).is_some() {
                if !event.kind.is_syscall_start() {
                    return Some(event);
                }
                skip = true;
            }
            if skip {
                if event.kind.is_syscall_end() {
                    skip = false;
                }
                None
            } else {
                Some(event)
            }
        }))
    }
}
