//! Sandboxing for a single replay run (spec.md §5 "Isolation"), grounded
//! on `examples/original_source/mreplay/execute.py`'s `Execute`/
//! `ExecuteJail`: an optional chroot, and for the jailed case a
//! unionfs-fuse overlay bind-mounted over it plus `/proc` and `/dev`.

use crate::error::IsolationError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Runs `cmd` (escalated via `sudo` unless already root) to completion,
/// translating a non-zero exit into `IsolationError::CommandFailed`
/// (`execute.py`'s `sudo`).
fn sudo(cmd: &[&str]) -> Result<(), IsolationError> {
    let mut full = Vec::with_capacity(cmd.len() + 1);
    if !running_as_root() {
        full.push("sudo");
    }
    full.extend_from_slice(cmd);

    let status = Command::new(full[0])
        .args(&full[1..])
        .status()
        .map_err(|source| IsolationError::Io {
            path: PathBuf::from(full[0]),
            source,
        })?;

    if !status.success() {
        return Err(IsolationError::CommandFailed {
            cmd: full.join(" "),
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Preparation a `ReplayDriver` runs inside the freshly-forked tracee
/// before exec, and the teardown the scheduler runs once the replay
/// exits (`execute.py`'s `Execute`/`ExecuteJail` pair).
pub trait IsolationContext {
    /// Acquires whatever mounts this context needs. Must be called exactly
    /// once, before the first replay runs against it (`execute.py`'s
    /// `with execute.open(...)`).
    fn open(&mut self) -> Result<(), IsolationError> {
        Ok(())
    }

    /// Called from within the child (possibly in a new pid/mount
    /// namespace) before the traced program execs.
    fn prepare(&self) -> Result<(), IsolationError>;

    fn close(&mut self) -> Result<(), IsolationError> {
        Ok(())
    }
}

/// No sandboxing: replays run directly against the host filesystem
/// (`execute.py`'s `Execute` with an empty chroot).
pub struct Unisolated;

impl IsolationContext for Unisolated {
    fn prepare(&self) -> Result<(), IsolationError> {
        Ok(())
    }
}

/// A chroot made of a read-only view of `/` overlaid with a disposable
/// scratch directory via unionfs-fuse, plus bind mounts for `/proc` and
/// `/dev` (`execute.py`'s `ExecuteJail`).
pub struct Jailed {
    root: PathBuf,
    scratch: TempDir,
    chroot: TempDir,
    persist: Option<PathBuf>,
    bound: Vec<PathBuf>,
    mounted: bool,
}

impl Jailed {
    pub fn new(root: PathBuf, persist: Option<PathBuf>) -> Result<Jailed, IsolationError> {
        let isolate_dir = Path::new("/tmp/isolate");
        std::fs::create_dir_all(isolate_dir).map_err(|source| IsolationError::Io {
            path: isolate_dir.to_path_buf(),
            source,
        })?;
        let scratch = TempDir::new_in(isolate_dir).map_err(|source| IsolationError::Io {
            path: isolate_dir.to_path_buf(),
            source,
        })?;
        let chroot = TempDir::new_in(isolate_dir).map_err(|source| IsolationError::Io {
            path: isolate_dir.to_path_buf(),
            source,
        })?;
        Ok(Jailed {
            root,
            scratch,
            chroot,
            persist,
            bound: Vec::new(),
            mounted: false,
        })
    }

    fn bind(&mut self, dir: &Path) -> Result<(), IsolationError> {
        let target = self.chroot.path().join(dir.strip_prefix("/").unwrap_or(dir));
        sudo(&["mount", "-o", "bind", &dir.to_string_lossy(), &target.to_string_lossy()])?;
        self.bound.push(dir.to_path_buf());
        Ok(())
    }

    fn unbind(&mut self, dir: &Path) -> Result<(), IsolationError> {
        let target = self.chroot.path().join(dir.strip_prefix("/").unwrap_or(dir));
        sudo(&["umount", "-l", &target.to_string_lossy()])?;
        self.bound.retain(|d| d != dir);
        Ok(())
    }
}

impl IsolationContext for Jailed {
    /// Opens the overlay and bind mounts (`ExecuteJail::open`). Must be
    /// called exactly once before any replay runs inside this jail.
    fn open(&mut self) -> Result<(), IsolationError> {
        sudo(&["touch", &self.scratch.path().join(".JAILED").to_string_lossy()])?;

        let mount_dirs = format!(
            "{}=rw:{}=ro",
            self.scratch.path().display(),
            self.root.display()
        );
        let mount_point = self.chroot.path().to_string_lossy().into_owned();
        sudo(&[
            "unionfs-fuse",
            "-o",
            "cow,allow_other,use_ino,suid,dev,nonempty,max_files=32768",
            &mount_dirs,
            &mount_point,
        ])?;

        self.bind(Path::new("/proc"))?;
        self.bind(Path::new("/dev"))?;
        if let Some(persist) = self.persist.clone() {
            self.bind(&persist)?;
        }
        self.mounted = true;
        Ok(())
    }

    fn prepare(&self) -> Result<(), IsolationError> {
        sudo(&["umount", "/proc"])?;
        sudo(&["mount", "-t", "proc", "proc", "/proc"])
    }

    fn close(&mut self) -> Result<(), IsolationError> {
        if !self.mounted {
            return Ok(());
        }
        for dir in self.bound.clone() {
            self.unbind(&dir)?;
        }
        sudo(&["fusermount", "-z", "-u", &self.chroot.path().to_string_lossy()])?;
        self.mounted = false;
        Ok(())
    }
}

impl Drop for Jailed {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
