//! Turns one divergence report into candidate mutations (spec.md §4.4),
//! grounded on `examples/original_source/mreplay/diverge_handler.py`.
//!
//! Scope reduction: the Python original additionally threads an
//! `on-the-fly` "mutations so far" list through `add_event`/`sys_match` so a
//! live replay can keep going past a non-fatal divergence without
//! re-parsing the log (`fly_offset_delta`, `self.mutations`). That
//! mechanism isn't ported; every candidate here is generated against the
//! mutated session's own `EventId`s the way the fatal (`re-run from
//! scratch`) path always worked, and on-the-fly divergences get the same
//! candidates with `ExecutionState::Running` instead of `Todo`.

use crate::event::{DivergeKind, EventId, EventKind, FlagDuration, StreamEvent};
use crate::explorer::execution::{ExecutionState, MutationKind};
use crate::session::{Location, LocationTarget, Session};
use libc::pid_t;

/// One proposed child mutation, ready to hand to `Execution::child`.
pub struct Candidate {
    pub mutation: MutationKind,
    pub state: ExecutionState,
    pub mutation_pid: pid_t,
    pub mutation_index: usize,
}

/// Which events a syscall-shaped culprit should be compared to when
/// scanning forward for a resynchronisation point: either a concrete
/// recorded syscall, or a not-yet-recorded one built from the driver's
/// divergence report.
struct SyscallProto {
    nr: i32,
    args: Vec<u8>,
}

fn is_addr(val: u64) -> bool {
    (val & 0xff80_0000) != 0
}

fn decode_args(args: &[u8]) -> Vec<u64> {
    args.chunks_exact(8).map(|c| u64::from_ne_bytes(c.try_into().unwrap())).collect()
}

/// `diverge_handler.py`'s `sys_match`, without the `self.mutations`
/// embedded-data-event comparison (no on-the-fly mutation list here).
fn sys_match(session: &Session, candidate: EventId, target: &SyscallProto) -> bool {
    let nr = match session.kind(candidate).syscall_nr() {
        Some(nr) => nr,
        None => return false,
    };
    if nr != target.nr {
        return false;
    }
    let cand_args = match session.kind(candidate).syscall_args() {
        Some(args) => decode_args(args),
        None => return false,
    };
    let target_args = decode_args(&target.args);
    for (a1, a2) in cand_args.iter().zip(target_args.iter()) {
        if a1 == a2 {
            continue;
        }
        if is_addr(*a1) && is_addr(*a2) {
            continue;
        }
        return false;
    }
    true
}

/// `diverge_handler.py`'s `mem_match`: same address, regardless of access
/// direction.
fn mem_match(session: &Session, a: EventId, b: EventId) -> bool {
    match (session.kind(a).memory_address(), session.kind(b).memory_address()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// `diverge_handler.py`'s `take_until_match` for the syscall case: scan
/// forward over `start`'s enclosing process's recorded syscalls, up to
/// `max_delete` of them, stopping at the first one matching `target`.
/// Returns `None` if no match was found within the bound.
fn take_until_match_syscall(
    session: &Session,
    start: EventId,
    start_syscall: EventId,
    target: &SyscallProto,
    max_delete: usize,
) -> Option<Vec<EventId>> {
    let pid = session.proc_of(start)?;
    let proc = session.processes.get(&pid)?;

    let mut events = vec![start];
    let mut found = false;
    for candidate in proc.syscalls.after(&session.arena, start_syscall).take(max_delete) {
        if sys_match(session, candidate, target) {
            found = true;
            break;
        }
        events.push(candidate);
    }
    if found {
        Some(events)
    } else {
        None
    }
}

/// `take_until_match` for the memory-access case: scan raw events forward
/// from `start` for another access to the same address.
fn take_until_match_memory(session: &Session, start: EventId, max_delete: usize) -> Option<Vec<EventId>> {
    let pid = session.proc_of(start)?;
    let proc = session.processes.get(&pid)?;

    let mut events = vec![start];
    let mut found = false;
    for candidate in proc.events.after(&session.arena, start).take(max_delete) {
        if session.kind(candidate).is_memory_access() {
            if mem_match(session, candidate, start) {
                found = true;
                break;
            }
            events.push(candidate);
        }
    }
    if found {
        Some(events)
    } else {
        None
    }
}

/// Signal events immediately preceding `syscall`, which the inserted
/// `SetFlags(UntilNextSyscall)` must land before (`diverge_handler.py`'s
/// "signals need the ignore-syscall event placed ahead of them" comment).
fn first_preceding_signal(session: &Session, syscall: EventId) -> Option<EventId> {
    let pid = session.proc_of(syscall)?;
    let proc = session.processes.get(&pid)?;
    let mut result = None;
    for event in proc.events.before(&session.arena, syscall) {
        if session.kind(event).is_signal() {
            result = Some(event);
        } else {
            break;
        }
    }
    result
}

fn set_flags_until_next_syscall(proc: pid_t, nr: i32, args: Vec<u8>) -> StreamEvent {
    let extra = EventKind::SyscallExtra { nr, ret: 0, args }.encode();
    StreamEvent::synthetic(
        EventKind::SetFlags {
            flags: 0,
            duration: FlagDuration::UntilNextSyscall,
            extra: Some(extra),
        },
        proc,
    )
}

/// Build the set of candidate mutations for one divergence, applying the
/// per-depth user `pattern` character (`+`/`-`/`r`/`None` = unconstrained)
/// the way `diverge_handler.py`'s `is_allowed_event` does.
pub fn handle(
    session: &Session,
    pid: pid_t,
    culprit: EventId,
    syscall: Option<EventId>,
    kind: &DivergeKind,
    fatal: bool,
    user_pattern: Option<char>,
    max_delete: usize,
) -> Vec<Candidate> {
    let allow = |c: char| user_pattern.is_none() || user_pattern == Some(c);
    let culprit_index = session.index(culprit).unwrap_or(0);
    let running_state = if fatal { ExecutionState::Todo } else { ExecutionState::Running };

    let mut candidates = Vec::new();

    match kind {
        DivergeKind::MemOwned { address, write_access } => {
            if allow('+') {
                let event = if *write_access {
                    StreamEvent::synthetic(EventKind::MemOwnedWriteExtra { address: *address }, pid)
                } else {
                    StreamEvent::synthetic(EventKind::MemOwnedReadExtra { address: *address }, pid)
                };
                candidates.push(Candidate {
                    mutation: MutationKind::Insert {
                        location: Location::before(LocationTarget::Event(culprit)),
                        event,
                    },
                    state: running_state,
                    mutation_pid: pid,
                    mutation_index: culprit_index + 1,
                });
            }
            if allow('-') {
                if let Some(starts) = take_until_match_memory(session, culprit, max_delete) {
                    candidates.push(Candidate {
                        mutation: MutationKind::Delete { starts },
                        state: ExecutionState::Todo,
                        mutation_pid: pid,
                        mutation_index: culprit_index + 1,
                    });
                }
            }
        }

        DivergeKind::EventType { is_rdtsc: true } => {
            if allow('+') {
                candidates.push(Candidate {
                    mutation: MutationKind::Insert {
                        location: Location::before(LocationTarget::Event(culprit)),
                        event: StreamEvent::synthetic(EventKind::Rdtsc, pid),
                    },
                    state: running_state,
                    mutation_pid: pid,
                    mutation_index: culprit_index + 1,
                });
            }
            if allow('-') {
                candidates.push(Candidate {
                    mutation: MutationKind::Delete { starts: vec![culprit] },
                    state: ExecutionState::Todo,
                    mutation_pid: pid,
                    mutation_index: culprit_index + 1,
                });
            }
        }

        DivergeKind::EventType { is_rdtsc: false } => {
            if allow('-') {
                candidates.push(Candidate {
                    mutation: MutationKind::Delete { starts: vec![culprit] },
                    state: ExecutionState::Todo,
                    mutation_pid: pid,
                    mutation_index: culprit_index + 1,
                });
            }
        }

        DivergeKind::Syscall { nr, args, num_args } => {
            let target = SyscallProto {
                nr: *nr,
                args: args[..(8 * num_args).min(args.len())].to_vec(),
            };
            let add_location = first_preceding_signal(session, culprit)
                .map(|signal| Location::before(LocationTarget::Event(signal)))
                .unwrap_or(Location::before(LocationTarget::Event(culprit)));

            if allow('+') {
                candidates.push(Candidate {
                    mutation: MutationKind::Insert {
                        location: add_location,
                        event: set_flags_until_next_syscall(pid, target.nr, target.args.clone()),
                    },
                    state: running_state,
                    mutation_pid: pid,
                    mutation_index: culprit_index,
                });
            }
            if allow('-') {
                if let Some(starts) = take_until_match_syscall(session, culprit, culprit, &target, max_delete) {
                    candidates.push(Candidate {
                        mutation: MutationKind::Delete { starts },
                        state: ExecutionState::Todo,
                        mutation_pid: pid,
                        mutation_index: culprit_index + 1,
                    });
                }
            }
        }

        DivergeKind::SyscallRet { ret } => {
            let syscall = match syscall {
                Some(s) => s,
                None => return candidates,
            };
            let nr = session.kind(syscall).syscall_nr().unwrap_or(0);
            let args = session.kind(syscall).syscall_args().unwrap_or(&[]).to_vec();
            let target = SyscallProto { nr, args: args.clone() };

            if allow('+') {
                candidates.push(Candidate {
                    mutation: MutationKind::Insert {
                        location: Location::before(LocationTarget::Event(syscall)),
                        event: set_flags_until_next_syscall(pid, nr, args.clone()),
                    },
                    state: running_state,
                    mutation_pid: pid,
                    mutation_index: session.index(syscall).unwrap_or(culprit_index),
                });
            }
            if allow('r') {
                candidates.push(Candidate {
                    mutation: MutationKind::Replace {
                        target: syscall,
                        replacement: StreamEvent::synthetic(
                            EventKind::SyscallExtra { nr, ret: *ret, args: args.clone() },
                            pid,
                        ),
                    },
                    state: running_state,
                    mutation_pid: pid,
                    mutation_index: session.index(syscall).unwrap_or(culprit_index),
                });
            }
            if allow('-') {
                if let Some(starts) = take_until_match_syscall(session, syscall, syscall, &target, max_delete) {
                    candidates.push(Candidate {
                        mutation: MutationKind::Delete { starts },
                        state: ExecutionState::Todo,
                        mutation_pid: pid,
                        mutation_index: session.index(syscall).map(|i| i + 1).unwrap_or(culprit_index),
                    });
                }
            }
        }

        DivergeKind::DataContent { .. } | DivergeKind::Other => {
            // `handle_data_content`/`handle_default`: fall back to the
            // enclosing syscall when there is one, else treat the culprit
            // itself as the resynchronisation anchor.
            let (start, target) = match syscall {
                Some(syscall) => {
                    let nr = session.kind(syscall).syscall_nr().unwrap_or(0);
                    let args = session.kind(syscall).syscall_args().unwrap_or(&[]).to_vec();
                    if allow('+') {
                        candidates.push(Candidate {
                            mutation: MutationKind::Insert {
                                location: Location::before(LocationTarget::Event(syscall)),
                                event: set_flags_until_next_syscall(pid, nr, args.clone()),
                            },
                            state: running_state,
                            mutation_pid: pid,
                            mutation_index: session.index(syscall).unwrap_or(culprit_index),
                        });
                    }
                    (syscall, Some(SyscallProto { nr, args }))
                }
                None => (culprit, None),
            };

            if allow('-') {
                let starts = match &target {
                    Some(target) => take_until_match_syscall(session, start, start, target, max_delete),
                    None => Some(vec![start]),
                };
                if let Some(starts) = starts {
                    candidates.push(Candidate {
                        mutation: MutationKind::Delete { starts },
                        state: ExecutionState::Todo,
                        mutation_pid: pid,
                        mutation_index: session.index(start).map(|i| i + 1).unwrap_or(culprit_index),
                    });
                }
            }
        }
    }

    candidates
}
