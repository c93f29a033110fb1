use crate::{Error, Registry, Tracee};
use crate::error::Violation;
use log::{error, warn};
use nix::sched::CloneFlags;
use nix::unistd::Pid;
use std::path::PathBuf;

/// An event reported by the tracer that affects the filesystem view of a tracee.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A new process was observed. `parent` is `None` for the process launched by the sandbox,
    /// `flags` are the clone flags the parent created it with.
    CreateProcess {
        pid: Pid,
        parent: Option<Pid>,
        flags: CloneFlags,
    },
    /// The process has exited or was detached.
    ExitProcess {
        pid: Pid,
    },
    /// The process is about to create a child with the given flags.
    Clone {
        pid: Pid,
        flags: CloneFlags,
    },
    /// The process loaded a different executable.
    Execute {
        pid: Pid,
        path: PathBuf,
    },
    /// The process changed its working directory.
    ChangeDirectory {
        pid: Pid,
        path: PathBuf,
    },
    /// The process changed its root directory.
    ChangeRoot {
        pid: Pid,
        path: PathBuf,
    },
}

impl Event {
    /// Returns the process ID the event is about.
    pub fn pid(&self) -> Pid {
        match self {
            Self::CreateProcess { pid, .. }
            | Self::ExitProcess { pid }
            | Self::Clone { pid, .. }
            | Self::Execute { pid, .. }
            | Self::ChangeDirectory { pid, .. }
            | Self::ChangeRoot { pid, .. } => *pid,
        }
    }
}

impl Registry {
    /// Applies the event to the tracees. A fatal error means the tracking state is inconsistent
    /// and the sandbox session has to be aborted.
    pub fn dispatch(&mut self, event: Event) -> Result<(), Error> {
        let pid = event.pid();
        let result = self.apply(event);

        if let Err(e) = &result {
            if e.is_fatal() {
                error!("tracee {pid}: {e}");
            } else {
                warn!("tracee {pid}: {e}");
            }
        }

        result
    }

    fn apply(&mut self, event: Event) -> Result<(), Error> {
        match event {
            Event::CreateProcess { pid, parent, flags } => {
                // The flags of this creation replace whatever the parent recorded before.
                if let Some(tracee) = parent.and_then(|parent| self.lookup_mut(parent)) {
                    tracee.set_clone_flags(flags);
                }

                let existed = self.contains(pid);
                self.get_or_create(pid)?;

                // A tracee that failed to inherit must not stay visible.
                if let Err(e) = self.inherit_fs_info(pid, parent) {
                    if !existed {
                        self.delete(pid)?;
                    }

                    return Err(e);
                }

                Ok(())
            }
            Event::ExitProcess { pid } => self.delete(pid),
            Event::Clone { pid, flags } => {
                self.tracee_mut(pid)?.set_clone_flags(flags);

                Ok(())
            }
            Event::Execute { pid, path } => self.tracee_mut(pid)?.set_exe(path),
            Event::ChangeDirectory { pid, path } => self.tracee_mut(pid)?.set_cwd(path),
            Event::ChangeRoot { pid, path } => self.tracee_mut(pid)?.set_root(path),
        }
    }

    fn tracee_mut(&mut self, pid: Pid) -> Result<&mut Tracee, Error> {
        match self.lookup_mut(pid) {
            Some(tracee) => Ok(tracee),
            None => Err(Violation::UnknownTracee(pid).into()),
        }
    }
}
