use super::{EventStream, Mutator, PipelineEnv};
use crate::event::{EventId, StreamEvent};
use std::collections::HashMap;

/// Swaps out specific events by identity (`mutator/replace.py`). Keys are
/// source `EventId`s; only events that originated from the canonical
/// session can be replaced, since synthetic events carry no identity.
pub struct Replace {
    replacements: HashMap<EventId, StreamEvent>,
}

impl Replace {
    pub fn new(replacements: HashMap<EventId, StreamEvent>) -> Replace {
        Replace { replacements }
    }
}

impl Mutator for Replace {
    fn start(&mut self, _env: &mut PipelineEnv) {}

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let replacements = self.replacements;
        Box::new(input.map(move |event| match event.source.and_then(|id| replacements.get(&id)) {
            Some(replacement) => replacement.clone(),
            None => event,
        }))
    }
}
