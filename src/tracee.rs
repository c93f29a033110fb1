pub mod fs;

pub use self::fs::{FsField, FsSlot, SharedPath, WeakPath};

use crate::{Config, Error};
use crate::error::Violation;
use self::fs::try_copy;
use log::{debug, trace};
use nix::sched::CloneFlags;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};

/// The executable path given to the first tracee until it calls execve(2).
pub const PLACEHOLDER_EXE: &str = "<dummy>";

#[derive(Debug)]
struct FsInfo {
    exe: PathBuf,
    root: FsSlot,
    cwd: FsSlot,
}

/// The tracee is a process that is currently being traced, along with its view of the
/// filesystem.
#[derive(Debug)]
pub struct Tracee {
    pid: Pid,
    fs: Option<FsInfo>,
    clone_flags: CloneFlags,
}

impl Tracee {
    pub(crate) fn new(pid: Pid) -> Self {
        Self {
            pid,
            fs: None,
            clone_flags: CloneFlags::empty(),
        }
    }

    /// Returns the process ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Returns true once the tracee inherited its filesystem information.
    pub fn is_initialized(&self) -> bool {
        self.fs.is_some()
    }

    /// Returns the path of the executable the tracee is running.
    pub fn exe(&self) -> Option<&Path> {
        self.fs.as_ref().map(|fs| fs.exe.as_path())
    }

    /// Returns the root of the filesystem as seen by the tracee.
    pub fn root(&self) -> Option<&FsSlot> {
        self.fs.as_ref().map(|fs| &fs.root)
    }

    /// Returns the current working directory of the tracee.
    pub fn cwd(&self) -> Option<&FsSlot> {
        self.fs.as_ref().map(|fs| &fs.cwd)
    }

    /// Returns the flags of the last process creation this tracee performed.
    pub fn clone_flags(&self) -> CloneFlags {
        self.clone_flags
    }

    /// Sets the flags the next child of this tracee is created with.
    pub fn set_clone_flags(&mut self, flags: CloneFlags) {
        self.clone_flags = flags;
    }

    /// Records the raw `flags` argument of a clone(2) the tracee is entering. Only the low 32 bits
    /// can be represented by [`CloneFlags`]; the clone3(2) high word and bits unknown to the host
    /// are dropped.
    pub fn record_clone(&mut self, flags: u64) {
        let low = (flags & 0xffff_ffff) as u32;
        self.clone_flags = CloneFlags::from_bits_truncate(low as libc::c_int);
    }

    /// Records a fork(2), which shares nothing with the parent.
    pub fn record_fork(&mut self) {
        self.clone_flags = CloneFlags::empty();
    }

    /// Records a vfork(2), which shares the address space but not the filesystem information.
    pub fn record_vfork(&mut self) {
        self.clone_flags = CloneFlags::CLONE_VM | CloneFlags::CLONE_VFORK;
    }

    /// Sets the executable path after an execve(2).
    pub fn set_exe(&mut self, path: PathBuf) -> Result<(), Error> {
        trace!("tracee {} executes {}", self.pid, path.display());
        self.fs_mut()?.exe = path;

        Ok(())
    }

    /// Sets the root after an emulated chroot(2).
    pub fn set_root(&mut self, path: PathBuf) -> Result<(), Error> {
        trace!("tracee {} changes root to {}", self.pid, path.display());
        self.fs_mut()?.root.set(path);

        Ok(())
    }

    /// Sets the working directory after a chdir(2) or fchdir(2).
    pub fn set_cwd(&mut self, path: PathBuf) -> Result<(), Error> {
        trace!("tracee {} changes directory to {}", self.pid, path.display());
        self.fs_mut()?.cwd.set(path);

        Ok(())
    }

    fn fs_mut(&mut self) -> Result<&mut FsInfo, Error> {
        match self.fs.as_mut() {
            Some(fs) => Ok(fs),
            None => Err(Violation::NotInitialized(self.pid).into()),
        }
    }

    /// Initializes the filesystem information of this freshly created tracee from its `parent`.
    /// Without a parent, the tracee was launched by the sandbox and starts from `config`.
    ///
    /// The executable path is always copied. The root and the working directory are shared with
    /// the parent if the parent created this tracee with `CLONE_FS`, and copied otherwise. On
    /// error this tracee is left untouched.
    pub(crate) fn inherit_from(
        &mut self,
        parent: Option<&mut Tracee>,
        config: &Config,
    ) -> Result<(), Error> {
        if self.fs.is_some() {
            return Err(Violation::AlreadyInitialized(self.pid).into());
        }

        let parent = match parent {
            Some(parent) => parent,
            None => {
                self.fs = Some(FsInfo {
                    exe: try_copy(Path::new(PLACEHOLDER_EXE))?,
                    root: FsSlot::Owned(try_copy(config.guest_rootfs())?),
                    cwd: FsSlot::Owned(try_copy(config.initial_cwd())?),
                });

                debug!("tracee {} starts in {}", self.pid, config.guest_rootfs().display());

                return Ok(());
            }
        };

        let flags = parent.clone_flags;
        let fs = match parent.fs.as_mut() {
            Some(fs) => fs,
            None => return Err(Violation::ParentNotInitialized(parent.pid).into()),
        };

        // Copy before sharing so that a failed allocation leaves the parent as it was.
        let exe = try_copy(&fs.exe)?;
        let root = if FsField::Root.is_shared_by(flags) {
            None
        } else {
            Some(fs.root.try_copy()?)
        };
        let cwd = if FsField::Cwd.is_shared_by(flags) {
            None
        } else {
            Some(fs.cwd.try_copy()?)
        };

        let info = FsInfo {
            exe,
            root: root.unwrap_or_else(|| FsSlot::Shared(fs.root.share())),
            cwd: cwd.unwrap_or_else(|| FsSlot::Shared(fs.cwd.share())),
        };

        debug!(
            "tracee {} inherits from {} (root {}, cwd {})",
            self.pid,
            parent.pid,
            if info.root.is_shared() { "shared" } else { "copied" },
            if info.cwd.is_shared() { "shared" } else { "copied" },
        );

        self.fs = Some(info);

        Ok(())
    }
}
