use super::location_matcher::LocationMatcher;
use super::{EventStream, Mutator, PipelineEnv};
use crate::event::StreamEvent;
use crate::session::Location;

/// Inserts one or more events immediately at a matched location
/// (`mutator/insert_event.py`).
pub struct InsertEvent {
    location: Location,
    events: Vec<StreamEvent>,
    matcher: Option<LocationMatcher>,
}

impl InsertEvent {
    pub fn new(location: Location, events: Vec<StreamEvent>) -> InsertEvent {
        InsertEvent {
            location,
            events,
            matcher: None,
        }
    }
}

impl Mutator for InsertEvent {
    fn start(&mut self, env: &mut PipelineEnv) {
        self.matcher = Some(LocationMatcher::single(&env.session, self.location));
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let matcher = self.matcher.expect("start() must run before process()");
        let events = self.events;
        Box::new(input.flat_map(move |event| {
            let mut out = Vec::new();
            if matcher.match_event(&event).is_some() {
                out.extend(events.iter().cloned());
            }
            out.push(event);
            out.into_iter()
        }))
    }
}
