//! Filesystem information that a tracee either owns or shares with other tracees.

use crate::Error;
use nix::sched::CloneFlags;
use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

/// Copies the path into a new buffer, reporting allocation failure rather than aborting.
pub(crate) fn try_copy(path: &Path) -> Result<PathBuf, Error> {
    let mut buffer = OsString::new();
    buffer.try_reserve_exact(path.as_os_str().len())?;
    buffer.push(path.as_os_str());

    Ok(PathBuf::from(buffer))
}

/// The per-tracee filesystem fields that clone(2) may share between parent and child.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FsField {
    /// The root of the filesystem as seen by the tracee.
    Root,
    /// The current working directory.
    Cwd,
}

impl FsField {
    /// Returns true if a child created with `flags` shares this field with its parent instead of
    /// receiving a copy.
    ///
    /// The kernel keeps the root and the working directory in the same `fs_struct`, so both are
    /// governed by `CLONE_FS`.
    pub fn is_shared_by(self, flags: CloneFlags) -> bool {
        match self {
            Self::Root | Self::Cwd => flags.contains(CloneFlags::CLONE_FS),
        }
    }
}

/// A reference-counted path shared by several tracees. The path is released once the last tracee
/// referring to it goes away, and an update made through one holder is seen by all of them.
#[derive(Debug)]
pub struct SharedPath(Rc<RefCell<PathBuf>>);

impl SharedPath {
    fn new(path: PathBuf) -> Self {
        Self(Rc::new(RefCell::new(path)))
    }

    /// Hands out another reference to the same cell.
    pub(crate) fn share(&self) -> Self {
        Self(Rc::clone(&self.0))
    }

    /// Returns the number of tracee fields referring to this cell.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Returns true if both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &SharedPath) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Returns a handle that observes the cell without keeping it alive.
    pub fn downgrade(&self) -> WeakPath {
        WeakPath(Rc::downgrade(&self.0))
    }

    fn with<R>(&self, f: impl FnOnce(&Path) -> R) -> R {
        f(self.0.borrow().as_path())
    }

    fn set(&self, path: PathBuf) {
        *self.0.borrow_mut() = path;
    }
}

/// A non-owning handle to a [`SharedPath`].
#[derive(Clone, Debug)]
pub struct WeakPath(Weak<RefCell<PathBuf>>);

impl WeakPath {
    /// Returns true as long as at least one tracee still refers to the cell.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Returns the number of tracee fields still referring to the cell.
    pub fn ref_count(&self) -> usize {
        self.0.strong_count()
    }
}

/// The root or the working directory of a tracee.
#[derive(Debug)]
pub enum FsSlot {
    /// The path belongs to this tracee alone.
    Owned(PathBuf),
    /// The path is shared with other tracees.
    Shared(SharedPath),
}

impl FsSlot {
    /// Calls `f` with the current path.
    pub fn with<R>(&self, f: impl FnOnce(&Path) -> R) -> R {
        match self {
            Self::Owned(path) => f(path.as_path()),
            Self::Shared(cell) => cell.with(f),
        }
    }

    /// Returns a copy of the current path.
    pub fn to_path_buf(&self) -> PathBuf {
        self.with(Path::to_path_buf)
    }

    /// Returns true if the path is shared with other tracees.
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Returns the shared cell, if any.
    pub fn as_shared(&self) -> Option<&SharedPath> {
        match self {
            Self::Shared(cell) => Some(cell),
            Self::Owned(_) => None,
        }
    }

    /// Returns the number of tracee fields referring to this path.
    pub fn ref_count(&self) -> usize {
        match self {
            Self::Owned(_) => 1,
            Self::Shared(cell) => cell.ref_count(),
        }
    }

    /// Returns true if both slots refer to the same shared cell.
    pub fn shares_with(&self, other: &FsSlot) -> bool {
        match (self, other) {
            (Self::Shared(a), Self::Shared(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Replaces the path. A shared path is updated in place for every holder.
    pub fn set(&mut self, path: PathBuf) {
        match self {
            Self::Owned(owned) => *owned = path,
            Self::Shared(cell) => cell.set(path),
        }
    }

    /// Returns an exclusively owned copy of the current path. Copying a shared path reads through
    /// the cell without taking a reference to it.
    pub(crate) fn try_copy(&self) -> Result<FsSlot, Error> {
        self.with(try_copy).map(Self::Owned)
    }

    /// Returns a new reference to the cell behind this slot, moving an owned path into a fresh
    /// cell first. Allocating the cell cannot be made fallible, so running out of memory here
    /// aborts instead of reporting [`Error::ResourceExhaustion`].
    pub(crate) fn share(&mut self) -> SharedPath {
        let cell = match self {
            Self::Shared(cell) => return cell.share(),
            Self::Owned(path) => SharedPath::new(std::mem::take(path)),
        };

        let reference = cell.share();
        *self = Self::Shared(cell);

        reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_fs_governs_both_fields() {
        for field in [FsField::Root, FsField::Cwd] {
            assert!(field.is_shared_by(CloneFlags::CLONE_FS | CloneFlags::CLONE_VM));
            assert!(!field.is_shared_by(CloneFlags::CLONE_VM | CloneFlags::CLONE_VFORK));
            assert!(!field.is_shared_by(CloneFlags::empty()));
        }
    }

    #[test]
    fn share_promotes_owned_path() {
        let mut slot = FsSlot::Owned(PathBuf::from("/srv/rootfs"));
        let reference = FsSlot::Shared(slot.share());

        assert!(slot.is_shared());
        assert!(slot.shares_with(&reference));
        assert_eq!(slot.ref_count(), 2);
        assert_eq!(reference.to_path_buf(), PathBuf::from("/srv/rootfs"));
    }

    #[test]
    fn update_is_visible_to_every_holder() {
        let mut slot = FsSlot::Owned(PathBuf::from("/"));
        let mut other = FsSlot::Shared(slot.share());

        other.set(PathBuf::from("/tmp"));
        assert_eq!(slot.to_path_buf(), PathBuf::from("/tmp"));

        slot.set(PathBuf::from("/var"));
        assert_eq!(other.to_path_buf(), PathBuf::from("/var"));
    }

    #[test]
    fn copy_of_shared_path_is_detached() {
        let mut slot = FsSlot::Owned(PathBuf::from("/home"));
        let _other = FsSlot::Shared(slot.share());

        let mut copy = slot.try_copy().unwrap();

        assert!(!copy.is_shared());
        assert_eq!(slot.ref_count(), 2);

        copy.set(PathBuf::from("/etc"));
        assert_eq!(slot.to_path_buf(), PathBuf::from("/home"));
    }

    #[test]
    fn cell_released_with_last_holder() {
        let mut slot = FsSlot::Owned(PathBuf::from("/"));
        let other = FsSlot::Shared(slot.share());
        let weak = slot.as_shared().unwrap().downgrade();

        drop(slot);
        assert!(weak.is_alive());
        assert_eq!(weak.ref_count(), 1);

        drop(other);
        assert!(!weak.is_alive());
    }

    #[test]
    fn owned_slots_never_share() {
        let a = FsSlot::Owned(PathBuf::from("/"));
        let b = FsSlot::Owned(PathBuf::from("/"));

        assert!(!a.shares_with(&b));
        assert_eq!(a.ref_count(), 1);
        assert!(a.as_shared().is_none());
    }
}
