use super::location_matcher::LocationMatcher;
use super::{EventStream, Mutator, PipelineEnv};
use crate::session::Location;
use libc::pid_t;
use std::collections::HashSet;

/// Stops streaming once every process named in `locations` has reached its
/// matched point, discarding each process's later events as soon as it
/// matches (`mutator/truncate_queue.py`, without the optional
/// drain-to-session-end path driven by its `env['graph']`).
pub struct TruncateQueue {
    locations: Vec<Location>,
    matcher: Option<LocationMatcher>,
}

impl TruncateQueue {
    pub fn new(locations: Vec<Location>) -> TruncateQueue {
        TruncateQueue {
            locations,
            matcher: None,
        }
    }
}

impl Mutator for TruncateQueue {
    fn start(&mut self, env: &mut PipelineEnv) {
        self.matcher = Some(LocationMatcher::new(&env.session, self.locations.clone()));
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let matcher = self.matcher.expect("start() must run before process()");
        let num_procs = self.locations.len();
        let mut truncated: HashSet<pid_t> = HashSet::new();
        let mut input = input;
        Box::new(std::iter::from_fn(move || loop {
            let event = input.next()?;
            if matcher.match_event(&event).is_some() {
                if let Some(pid) = event.proc {
                    truncated.insert(pid);
                }
                if truncated.len() >= num_procs {
                    return None;
                }
                continue;
            }
            let suppress = event.proc.map_or(false, |pid| truncated.contains(&pid));
            if !suppress {
                return Some(event);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::session::{LocationTarget, Session};
    use std::rc::Rc;

    /// `test_truncate_queue_atom`: stops a single process right after its
    /// matched location, discarding everything after.
    #[test]
    fn stops_one_process_after_its_matched_location() {
        let raw = vec![EventKind::Pid(1), EventKind::Fence, EventKind::Fence];
        let session = Rc::new(Session::from_raw_events(raw));
        let first = session.processes[&1].events.get(0).unwrap();
        let second = session.processes[&1].events.get(1).unwrap();

        let mut env = PipelineEnv::new(Rc::clone(&session));
        let mut mutator: Box<dyn Mutator> = Box::new(TruncateQueue::new(vec![Location::after(LocationTarget::Event(first))]));
        mutator.start(&mut env);

        let source: EventStream = Box::new(
            vec![
                StreamEvent::from_session(EventKind::Fence, Some(1), first),
                StreamEvent::from_session(EventKind::Fence, Some(1), second),
            ]
            .into_iter(),
        );
        let out: Vec<StreamEvent> = mutator.process(source).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, Some(first));
    }

    /// `test_truncate_queue`: once every named process has reached its
    /// matched point, the whole stream stops, even mid-process for others.
    #[test]
    fn stops_whole_stream_once_every_named_process_matched() {
        let raw = vec![
            EventKind::Pid(1),
            EventKind::Fence,
            EventKind::Fence,
            EventKind::Pid(2),
            EventKind::Fence,
        ];
        let session = Rc::new(Session::from_raw_events(raw));
        let p1_0 = session.processes[&1].events.get(0).unwrap();
        let p1_1 = session.processes[&1].events.get(1).unwrap();
        let p2_0 = session.processes[&2].events.get(0).unwrap();

        let locations = vec![
            Location::after(LocationTarget::Event(p1_0)),
            Location::before(LocationTarget::Event(p2_0)),
        ];

        let mut env = PipelineEnv::new(Rc::clone(&session));
        let mut mutator: Box<dyn Mutator> = Box::new(TruncateQueue::new(locations));
        mutator.start(&mut env);

        let source: EventStream = Box::new(
            vec![
                StreamEvent::from_session(EventKind::Fence, Some(1), p1_0),
                StreamEvent::from_session(EventKind::Fence, Some(1), p1_1),
                StreamEvent::from_session(EventKind::Fence, Some(2), p2_0),
            ]
            .into_iter(),
        );
        let out: Vec<StreamEvent> = mutator.process(source).collect();

        // p1_1 is suppressed (process 1 already truncated after p1_0);
        // reaching p2_0's match point hits every named process and ends
        // the whole stream before p2_0 itself is emitted.
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, Some(p1_0));
    }
}
