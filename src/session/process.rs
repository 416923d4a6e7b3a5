use super::arena::EventArena;
use super::event_list::EventList;
use crate::event::EventId;
use libc::pid_t;

/// x86-64 `execve` syscall number, used only to recognise the event whose
/// success marks a process's name (spec.md §3 "Process": "On an `execve`
/// success, the first string-data child is captured as the process name").
const NR_EXECVE: i32 = 59;

/// A recorded process (spec.md §3 "Process"). Holds the two parallel lists
/// described there: every event in order, and just the syscall-start
/// events, with `current_syscall` tracking which syscall (if any) is open
/// so interior events get linked to their enclosing syscall as they're
/// appended.
#[derive(Debug)]
pub struct Process {
    pub pid: pid_t,
    pub name: Option<String>,
    pub events: EventList,
    pub syscalls: EventList,
    current_syscall: Option<EventId>,
}

impl Process {
    pub fn new(pid: pid_t) -> Process {
        Process {
            pid,
            name: None,
            events: EventList::new(),
            syscalls: EventList::new(),
            current_syscall: None,
        }
    }

    pub fn current_syscall(&self) -> Option<EventId> {
        self.current_syscall
    }

    /// Append `e` (already pushed into `arena`) to this process's streams,
    /// linking it to the currently-open syscall if any.
    pub fn add_event(&mut self, arena: &mut EventArena, e: EventId) {
        arena.get_mut(e).proc = Some(self.pid);
        self.events.append(arena, e);

        if arena.get(e).kind.is_syscall_start() {
            self.syscalls.append(arena, e);
            self.current_syscall = Some(e);
        }

        if let Some(syscall) = self.current_syscall {
            arena.get_mut(e).syscall = Some(syscall);
        }

        if arena.get(e).kind.is_syscall_end() {
            if let Some(syscall) = self.current_syscall {
                self.maybe_capture_execve_name(arena, syscall);
            }
            self.current_syscall = None;
        }
    }

    fn maybe_capture_execve_name(&mut self, arena: &EventArena, syscall: EventId) {
        let record = arena.get(syscall);
        let (nr, ret) = match &record.kind {
            crate::event::EventKind::SyscallExtra { nr, ret, .. } => (*nr, *ret),
            _ => return,
        };
        if nr != NR_EXECVE || ret < 0 {
            return;
        }
        for child in children_of(arena, &self.events, syscall) {
            if arena.get(child).kind.is_string_data() {
                if let Some(bytes) = arena.get(child).kind.data_bytes() {
                    self.name = Some(String::from_utf8_lossy(bytes).into_owned());
                }
                break;
            }
        }
    }
}

/// Events strictly between a syscall-start and its matching syscall-end
/// (spec.md §3 "Event.children": "lazy view of events between a
/// syscall-start and its matching syscall-end").
pub fn children_of<'a>(
    arena: &'a EventArena,
    events: &'a EventList,
    syscall_start: EventId,
) -> impl Iterator<Item = EventId> + 'a {
    events
        .after(arena, syscall_start)
        .take_while(move |e| !arena.get(*e).kind.is_syscall_end())
}
