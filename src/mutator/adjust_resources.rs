use super::{EventStream, Mutator, PipelineEnv};
use crate::event::EventKind;
use std::collections::HashMap;

/// Rewrites resource-lock serial numbers so they're contiguous again after
/// other stages delete or reorder events (`mutator/adjust_resources.py`).
/// Two-pass: first tally how many times each (resource id, serial) pair
/// occurs, then compact each resource's serial sequence, then rewrite.
pub struct AdjustResources;

impl AdjustResources {
    pub fn new() -> AdjustResources {
        AdjustResources
    }
}

impl Mutator for AdjustResources {
    fn start(&mut self, _env: &mut PipelineEnv) {}

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let events: Vec<_> = input.collect();

        let mut counts: HashMap<u32, HashMap<u32, u32>> = HashMap::new();
        for event in &events {
            if let EventKind::ResourceLockExtra { id, serial } = &event.kind {
                *counts.entry(*id).or_default().entry(*serial).or_insert(0) += 1;
            }
        }

        let mut remap: HashMap<u32, HashMap<u32, u32>> = HashMap::new();
        for (id, serial_counts) in &counts {
            let mut sorted: Vec<u32> = serial_counts.keys().copied().collect();
            sorted.sort_unstable();
            let mut last_serial = 0u32;
            let mut out = HashMap::new();
            for (i, serial) in sorted.iter().copied().enumerate() {
                let count = serial_counts[&serial];
                if i == 0 {
                    last_serial = count;
                    out.insert(serial, 0u32);
                    continue;
                }
                let deficit = serial - last_serial;
                last_serial += count;
                out.insert(serial, serial - deficit);
            }
            remap.insert(*id, out);
        }

        Box::new(events.into_iter().map(move |mut event| {
            if let EventKind::ResourceLockExtra { id, serial } = &event.kind {
                if let Some(&new_serial) = remap.get(id).and_then(|m| m.get(serial)) {
                    if new_serial != *serial {
                        if let EventKind::ResourceLockExtra { serial: s, .. } = &mut event.kind {
                            *s = new_serial;
                        }
                    }
                }
            }
            event
        }))
    }
}
