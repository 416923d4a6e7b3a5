//! Minimal binary codec for `EventKind`.
//!
//! spec.md §6 describes the wire format as owned entirely by the external
//! scribe facility; this module is the concrete stand-in needed to make
//! `ToRawEvents`, log generation, and `Session::from_raw_buffer` buildable.
//! Layout: a one-byte tag followed by tag-specific fields, with variable
//! length byte blobs prefixed by a little-endian `u32` length. Not meant to
//! be wire-compatible with the real scribe format.

use super::{BookmarkKind, DataKind, EventKind, FlagDuration};
use crate::error::SessionError;
use std::convert::TryInto;

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], SessionError> {
    let len = read_u32(buf, pos)? as usize;
    let end = *pos + len;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| SessionError::Malformed("truncated byte blob".into()))?;
    *pos = end;
    Ok(slice)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, SessionError> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| SessionError::Malformed("truncated u32".into()))?
        .try_into()
        .unwrap();
    *pos += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(buf: &[u8], pos: &mut usize) -> Result<u64, SessionError> {
    let bytes: [u8; 8] = buf
        .get(*pos..*pos + 8)
        .ok_or_else(|| SessionError::Malformed("truncated u64".into()))?
        .try_into()
        .unwrap();
    *pos += 8;
    Ok(u64::from_le_bytes(bytes))
}

fn read_i32(buf: &[u8], pos: &mut usize) -> Result<i32, SessionError> {
    Ok(read_u32(buf, pos)? as i32)
}

fn read_i64(buf: &[u8], pos: &mut usize) -> Result<i64, SessionError> {
    Ok(read_u64(buf, pos)? as i64)
}

fn read_tag(buf: &[u8], pos: &mut usize) -> Result<u8, SessionError> {
    let b = *buf
        .get(*pos)
        .ok_or_else(|| SessionError::Malformed("truncated tag".into()))?;
    *pos += 1;
    Ok(b)
}

impl EventKind {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            EventKind::Init => buf.push(0),
            EventKind::Pid(pid) => {
                buf.push(1);
                buf.extend_from_slice(&(*pid as u32).to_le_bytes());
            }
            EventKind::SyscallExtra { nr, ret, args } => {
                buf.push(2);
                buf.extend_from_slice(&nr.to_le_bytes());
                buf.extend_from_slice(&ret.to_le_bytes());
                push_bytes(&mut buf, args);
            }
            EventKind::SyscallEnd => buf.push(3),
            EventKind::DataExtra { data_type, data } => {
                buf.push(4);
                match data_type {
                    DataKind::InputString => buf.extend_from_slice(&0u32.to_le_bytes()),
                    DataKind::Other(v) => buf.extend_from_slice(&v.to_le_bytes()),
                }
                push_bytes(&mut buf, data);
            }
            EventKind::Data { data } => {
                buf.push(5);
                push_bytes(&mut buf, data);
            }
            EventKind::Fence => buf.push(6),
            EventKind::Rdtsc => buf.push(7),
            EventKind::ResourceLockExtra { id, serial } => {
                buf.push(8);
                buf.extend_from_slice(&id.to_le_bytes());
                buf.extend_from_slice(&serial.to_le_bytes());
            }
            EventKind::ResourceLock => buf.push(9),
            EventKind::ResourceUnlock => buf.push(10),
            EventKind::MemOwnedReadExtra { address } => {
                buf.push(11);
                buf.extend_from_slice(&address.to_le_bytes());
            }
            EventKind::MemOwnedWriteExtra { address } => {
                buf.push(12);
                buf.extend_from_slice(&address.to_le_bytes());
            }
            EventKind::SetFlags {
                flags,
                duration,
                extra,
            } => {
                buf.push(13);
                buf.extend_from_slice(&flags.to_le_bytes());
                buf.push(match duration {
                    FlagDuration::UntilNextSyscall => 0,
                    FlagDuration::Permanent => 1,
                });
                match extra {
                    Some(e) => {
                        buf.push(1);
                        push_bytes(&mut buf, e);
                    }
                    None => buf.push(0),
                }
            }
            EventKind::Nop { encoded } => {
                buf.push(14);
                push_bytes(&mut buf, encoded);
            }
            EventKind::IgnoreSyscall => buf.push(15),
            EventKind::Signal { signo } => {
                buf.push(16);
                buf.extend_from_slice(&signo.to_le_bytes());
            }
            EventKind::QueueEof => buf.push(17),
            EventKind::Bookmark { id, npr, kind } => {
                buf.push(18);
                buf.extend_from_slice(&id.to_le_bytes());
                buf.extend_from_slice(&(*npr as u32).to_le_bytes());
                buf.push(match kind {
                    BookmarkKind::PreSyscall => 0,
                    BookmarkKind::PostSyscall => 1,
                });
            }
        }
        buf
    }

    pub fn decode(buf: &[u8], pos: &mut usize) -> Result<EventKind, SessionError> {
        let tag = read_tag(buf, pos)?;
        Ok(match tag {
            0 => EventKind::Init,
            1 => EventKind::Pid(read_u32(buf, pos)? as libc::pid_t),
            2 => {
                let nr = read_i32(buf, pos)?;
                let ret = read_i64(buf, pos)?;
                let args = read_bytes(buf, pos)?.to_vec();
                EventKind::SyscallExtra { nr, ret, args }
            }
            3 => EventKind::SyscallEnd,
            4 => {
                let dt = read_u32(buf, pos)?;
                let data_type = if dt == 0 {
                    DataKind::InputString
                } else {
                    DataKind::Other(dt)
                };
                let data = read_bytes(buf, pos)?.to_vec();
                EventKind::DataExtra { data_type, data }
            }
            5 => EventKind::Data {
                data: read_bytes(buf, pos)?.to_vec(),
            },
            6 => EventKind::Fence,
            7 => EventKind::Rdtsc,
            8 => {
                let id = read_u32(buf, pos)?;
                let serial = read_u32(buf, pos)?;
                EventKind::ResourceLockExtra { id, serial }
            }
            9 => EventKind::ResourceLock,
            10 => EventKind::ResourceUnlock,
            11 => EventKind::MemOwnedReadExtra {
                address: read_u64(buf, pos)?,
            },
            12 => EventKind::MemOwnedWriteExtra {
                address: read_u64(buf, pos)?,
            },
            13 => {
                let flags = read_u32(buf, pos)?;
                let duration = if read_tag(buf, pos)? == 0 {
                    FlagDuration::UntilNextSyscall
                } else {
                    FlagDuration::Permanent
                };
                let extra = if read_tag(buf, pos)? == 1 {
                    Some(read_bytes(buf, pos)?.to_vec())
                } else {
                    None
                };
                EventKind::SetFlags {
                    flags,
                    duration,
                    extra,
                }
            }
            14 => EventKind::Nop {
                encoded: read_bytes(buf, pos)?.to_vec(),
            },
            15 => EventKind::IgnoreSyscall,
            16 => EventKind::Signal {
                signo: read_i32(buf, pos)?,
            },
            17 => EventKind::QueueEof,
            18 => {
                let id = read_u64(buf, pos)?;
                let npr = read_u32(buf, pos)? as usize;
                let kind = if read_tag(buf, pos)? == 0 {
                    BookmarkKind::PreSyscall
                } else {
                    BookmarkKind::PostSyscall
                };
                EventKind::Bookmark { id, npr, kind }
            }
            other => return Err(SessionError::Malformed(format!("unknown event tag {}", other))),
        })
    }
}

/// Decode a whole raw buffer (as produced by `mmap`-ing the trace log) into
/// a flat sequence of `EventKind`s.
pub fn decode_all(buf: &[u8]) -> Result<Vec<EventKind>, SessionError> {
    let mut pos = 0;
    let mut out = Vec::new();
    while pos < buf.len() {
        out.push(EventKind::decode(buf, &mut pos)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(kind: EventKind) {
        let encoded = kind.encode();
        let mut pos = 0;
        let decoded = EventKind::decode(&encoded, &mut pos).unwrap();
        assert_eq!(pos, encoded.len());
        assert_eq!(format!("{:?}", kind), format!("{:?}", decoded));
    }

    #[test]
    fn roundtrips_every_kind() {
        roundtrip(EventKind::Init);
        roundtrip(EventKind::Pid(42));
        roundtrip(EventKind::SyscallExtra {
            nr: 1,
            ret: -1,
            args: vec![1, 2, 3, 4],
        });
        roundtrip(EventKind::SyscallEnd);
        roundtrip(EventKind::DataExtra {
            data_type: DataKind::InputString,
            data: b"hello".to_vec(),
        });
        roundtrip(EventKind::Data { data: vec![9, 9] });
        roundtrip(EventKind::Fence);
        roundtrip(EventKind::Rdtsc);
        roundtrip(EventKind::ResourceLockExtra { id: 1, serial: 7 });
        roundtrip(EventKind::ResourceLock);
        roundtrip(EventKind::ResourceUnlock);
        roundtrip(EventKind::MemOwnedReadExtra { address: 0xABCD });
        roundtrip(EventKind::MemOwnedWriteExtra { address: 0xBEEF });
        roundtrip(EventKind::SetFlags {
            flags: 0,
            duration: FlagDuration::UntilNextSyscall,
            extra: Some(vec![1, 2]),
        });
        roundtrip(EventKind::Nop {
            encoded: vec![1, 2, 3],
        });
        roundtrip(EventKind::IgnoreSyscall);
        roundtrip(EventKind::Signal { signo: 11 });
        roundtrip(EventKind::QueueEof);
        roundtrip(EventKind::Bookmark {
            id: 3,
            npr: 2,
            kind: BookmarkKind::PostSyscall,
        });
    }

    #[test]
    fn decode_all_splits_consecutive_events() {
        let a = EventKind::Fence.encode();
        let b = EventKind::Rdtsc.encode();
        let mut buf = a;
        buf.extend(b);
        let events = decode_all(&buf).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EventKind::Fence));
        assert!(matches!(events[1], EventKind::Rdtsc));
    }
}
