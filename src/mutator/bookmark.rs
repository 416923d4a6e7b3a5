use super::location_matcher::LocationMatcher;
use super::{EventStream, Mutator, PipelineEnv};
use crate::event::{BookmarkKind, EventKind, StreamEvent};
use crate::session::{Anchor, Location};

/// Inserts a `Bookmark` event at each matched location, tagged with a
/// pipeline-wide bookmark id (`mutator/bookmark.py`). Bookmark id 0 also
/// suppresses forwarding any `Bookmark` events already in the stream, to
/// avoid duplicating the marker `MutateOnTheFly`'s divergence point uses.
pub struct Bookmark {
    locations: Vec<Location>,
    matcher: Option<LocationMatcher>,
    bookmark_id: u64,
}

impl Bookmark {
    pub fn new(locations: Vec<Location>) -> Bookmark {
        Bookmark {
            locations,
            matcher: None,
            bookmark_id: 0,
        }
    }
}

impl Mutator for Bookmark {
    fn start(&mut self, env: &mut PipelineEnv) {
        self.matcher = Some(LocationMatcher::new(&env.session, self.locations.clone()));
        self.bookmark_id = env.next_bookmark_id();
    }

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let matcher = self.matcher.expect("start() must run before process()");
        let npr = self.locations.len();
        let bookmark_id = self.bookmark_id;
        Box::new(input.flat_map(move |event| {
            let mut out = Vec::new();
            if let Some(anchor) = matcher.match_event(&event) {
                let kind = match anchor {
                    Anchor::Before => BookmarkKind::PreSyscall,
                    Anchor::After => BookmarkKind::PostSyscall,
                };
                let proc = event.proc.expect("bookmarked event must have an owning process");
                out.push(StreamEvent::synthetic(
                    EventKind::Bookmark {
                        id: bookmark_id,
                        npr,
                        kind,
                    },
                    proc,
                ));
            }
            if !(event.kind.is_bookmark() && bookmark_id == 0) {
                out.push(event);
            }
            out.into_iter()
        }))
    }
}
