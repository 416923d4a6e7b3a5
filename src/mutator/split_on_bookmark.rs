use super::{EventStream, Mutator, PipelineEnv};
use crate::event::{EventKind, StreamEvent};
use libc::pid_t;
use std::collections::{HashMap, HashSet};

/// x86-64 `fork`/`vfork`/`clone`, the syscalls whose positive return value
/// in the parent names a freshly-spawned child pid
/// (`mreplay.unistd.SYS_fork` in `mutator/split_on_bookmark.py`).
const SYS_FORK_LIKE: &[i32] = &[57, 58, 56];

/// Splits a raw event stream at a bookmark id into the prefix leading up
/// to it (`do_tail = false`, the default) or the suffix from it onward
/// (`do_tail = true`), following each process's live fork tree so
/// children spawned before the cutoff are attributed to the right half
/// (`mutator/split_on_bookmark.py`).
pub struct SplitOnBookmark {
    cutoff: u64,
    do_tail: bool,
}

impl SplitOnBookmark {
    pub fn new(cutoff: u64, do_tail: bool) -> SplitOnBookmark {
        SplitOnBookmark { cutoff, do_tail }
    }
}

fn emit(out: &mut Vec<StreamEvent>, output_pid: &mut pid_t, pid: pid_t, event: StreamEvent) {
    if *output_pid != pid {
        out.push(StreamEvent::synthetic(EventKind::Pid(pid), pid));
        *output_pid = pid;
    }
    out.push(event);
}

fn drain_pending(
    pending: &mut HashMap<pid_t, Vec<StreamEvent>>,
    out: &mut Vec<StreamEvent>,
    output_pid: &mut pid_t,
) {
    let mut pids: Vec<pid_t> = pending.keys().copied().collect();
    pids.sort_unstable();
    for pid in pids {
        if let Some(events) = pending.remove(&pid) {
            for e in events {
                emit(out, output_pid, pid, e);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn include_child(
    pid: pid_t,
    pending: &mut HashMap<pid_t, Vec<StreamEvent>>,
    children: &HashMap<pid_t, Vec<pid_t>>,
    streaming: &mut HashSet<pid_t>,
    done: &HashSet<pid_t>,
    do_head: bool,
    out: &mut Vec<StreamEvent>,
    output_pid: &mut pid_t,
) {
    if let Some(events) = pending.remove(&pid) {
        if do_head {
            for e in events {
                emit(out, output_pid, pid, e);
            }
        }
    }
    if let Some(kids) = children.get(&pid).cloned() {
        for child in kids {
            include_child(child, pending, children, streaming, done, do_head, out, output_pid);
            if !done.contains(&child) {
                streaming.insert(child);
            }
        }
    }
}

impl Mutator for SplitOnBookmark {
    fn start(&mut self, _env: &mut PipelineEnv) {}

    fn process(self: Box<Self>, input: EventStream) -> EventStream {
        let do_head = !self.do_tail;
        let do_tail = self.do_tail;
        let cutoff = self.cutoff;

        let mut out: Vec<StreamEvent> = Vec::new();
        let mut output_pid: pid_t = 0;

        let mut pending: HashMap<pid_t, Vec<StreamEvent>> = HashMap::new();
        let mut children: HashMap<pid_t, Vec<pid_t>> = HashMap::new();
        let mut streaming: HashSet<pid_t> = HashSet::new();
        let mut done: HashSet<pid_t> = HashSet::new();
        let mut pid: pid_t = 0;
        let mut bookmarks_count = 0usize;
        let mut npr: Option<usize> = None;
        let mut stream_tail = false;

        'outer: for event in input {
            if let EventKind::Pid(p) = event.kind {
                pid = p;
                continue;
            }

            if stream_tail {
                if do_tail {
                    emit(&mut out, &mut output_pid, pid, event);
                }
                continue;
            }

            if npr == Some(bookmarks_count) && streaming.is_empty() {
                if do_head {
                    break 'outer;
                }
                drain_pending(&mut pending, &mut out, &mut output_pid);
                stream_tail = true;
                emit(&mut out, &mut output_pid, pid, event);
                continue;
            }

            if done.contains(&pid) {
                if do_tail {
                    emit(&mut out, &mut output_pid, pid, event);
                }
                continue;
            }

            if pid == 0 {
                if do_head {
                    emit(&mut out, &mut output_pid, pid, event);
                }
                continue;
            }

            if let EventKind::Bookmark { id, npr: event_npr, .. } = &event.kind {
                if *id == cutoff {
                    npr = Some(*event_npr);
                    bookmarks_count += 1;

                    include_child(
                        pid,
                        &mut pending,
                        &children,
                        &mut streaming,
                        &done,
                        do_head,
                        &mut out,
                        &mut output_pid,
                    );

                    if do_head {
                        emit(&mut out, &mut output_pid, pid, event);
                    }
                    done.insert(pid);
                    streaming.remove(&pid);
                    continue;
                }
            }

            if let EventKind::SyscallExtra { nr, ret, .. } = &event.kind {
                if SYS_FORK_LIKE.contains(nr) && *ret > 0 {
                    children.entry(pid).or_default().push(*ret as pid_t);
                }
            }

            let is_eof = event.kind.is_queue_eof();

            if streaming.contains(&pid) {
                if do_head {
                    emit(&mut out, &mut output_pid, pid, event);
                }
            } else {
                pending.entry(pid).or_default().push(event);
            }

            if is_eof {
                done.insert(pid);
                streaming.remove(&pid);
            }
        }

        if npr != Some(bookmarks_count) && do_head {
            drain_pending(&mut pending, &mut out, &mut output_pid);
        }

        Box::new(out.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `test_split_on_bookmark`'s `cutoff=0` case: a single process with no
    /// forked children streams its buffered prefix once its own bookmark
    /// is seen, with one `Pid` marker inserted at the first emission.
    #[test]
    fn streams_buffered_prefix_once_its_own_bookmark_is_seen() {
        let raw = vec![
            StreamEvent::synthetic(EventKind::Init, 0),
            StreamEvent::synthetic(EventKind::Pid(1), 1),
            StreamEvent::synthetic(EventKind::Fence, 1),
            StreamEvent::synthetic(EventKind::SyscallExtra { nr: 57, ret: -1, args: Vec::new() }, 1),
            StreamEvent::synthetic(
                EventKind::Bookmark {
                    id: 0,
                    npr: 1,
                    kind: crate::event::BookmarkKind::PreSyscall,
                },
                1,
            ),
        ];

        let mut env = PipelineEnv::new(std::rc::Rc::new(crate::session::Session::new()));
        let mut mutator: Box<dyn Mutator> = Box::new(SplitOnBookmark::new(0, false));
        mutator.start(&mut env);
        let out: Vec<StreamEvent> = mutator.process(Box::new(raw.into_iter())).collect();

        assert!(matches!(out[0].kind, EventKind::Init));
        assert!(matches!(out[1].kind, EventKind::Pid(1)));
        assert!(matches!(out[2].kind, EventKind::Fence));
        assert!(matches!(out[3].kind, EventKind::SyscallExtra { ret: -1, .. }));
        assert!(matches!(out[4].kind, EventKind::Bookmark { id: 0, .. }));
        assert_eq!(out.len(), 5);
    }
}
