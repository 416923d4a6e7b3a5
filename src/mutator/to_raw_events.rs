use crate::event::StreamEvent;

/// Terminal pipeline stage: strips wrapper state, yielding each event's
/// encoded bytes ready to write to a log (`mutator/to_raw_events.py`). Not
/// a `Mutator` impl since its output type differs from `StreamEvent`.
pub fn to_raw_events(events: impl Iterator<Item = StreamEvent>) -> impl Iterator<Item = Vec<u8>> {
    events.map(|event| event.kind.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    /// `test_to_raw_events`: encoding is just each event's own wire bytes,
    /// in stream order.
    #[test]
    fn encodes_each_event_in_order() {
        let events = vec![
            StreamEvent::synthetic(EventKind::Fence, 1),
            StreamEvent::synthetic(EventKind::SyscallExtra { nr: 1, ret: 0, args: Vec::new() }, 1),
        ];
        let expected: Vec<Vec<u8>> = vec![
            EventKind::Fence.encode(),
            EventKind::SyscallExtra { nr: 1, ret: 0, args: Vec::new() }.encode(),
        ];
        let out: Vec<Vec<u8>> = to_raw_events(events.into_iter()).collect();
        assert_eq!(out, expected);
    }
}
