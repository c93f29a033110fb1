//! Bookkeeping of traced processes and their view of the filesystem: the executable they run,
//! their root and their working directory, along with how that view is copied or shared when a
//! tracee creates children.

pub mod config;
pub mod error;
pub mod event;
pub mod registry;
pub mod tracee;

pub use config::Config;
pub use error::{Error, Violation};
pub use event::Event;
pub use nix::sched::CloneFlags;
pub use nix::unistd::Pid;
pub use registry::Registry;
pub use tracee::{FsField, FsSlot, SharedPath, Tracee, WeakPath};
