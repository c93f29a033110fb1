use std::path::{Path, PathBuf};
use tracee_fs::{CloneFlags, Config, Error, Pid, Registry, Violation};

fn pid(raw: i32) -> Pid {
    Pid::from_raw(raw)
}

/// Registers the first tracee plus a child created with `flags`.
fn parent_and_child(flags: CloneFlags) -> Registry {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut registry = Registry::new(Config::new("/srv/rootfs", "/home"));

    registry.get_or_create(pid(1)).unwrap();
    registry.inherit_fs_info(pid(1), None).unwrap();

    let parent = registry.lookup_mut(pid(1)).unwrap();
    parent.set_exe(PathBuf::from("/bin/sh")).unwrap();
    parent.set_clone_flags(flags);

    registry.get_or_create(pid(2)).unwrap();
    registry.inherit_fs_info(pid(2), Some(pid(1))).unwrap();

    registry
}

#[test]
fn same_cell_after_clone_fs() {
    let registry = parent_and_child(CloneFlags::CLONE_FS);

    let parent = registry.lookup(pid(1)).unwrap();
    let child = registry.lookup(pid(2)).unwrap();

    assert_eq!(child.exe(), Some(Path::new("/bin/sh")));
    assert!(child.root().unwrap().shares_with(parent.root().unwrap()));
    assert!(child.cwd().unwrap().shares_with(parent.cwd().unwrap()));
    assert_eq!(parent.root().unwrap().ref_count(), 2);
    assert_eq!(parent.cwd().unwrap().ref_count(), 2);
}

#[test]
fn shared_cell_released_once_by_last_holder() {
    let mut registry = parent_and_child(CloneFlags::CLONE_FS);

    let root = registry
        .lookup(pid(1))
        .and_then(|tracee| tracee.root())
        .and_then(|root| root.as_shared())
        .map(|cell| cell.downgrade())
        .unwrap();

    registry.delete(pid(2)).unwrap();
    assert!(root.is_alive());
    assert_eq!(root.ref_count(), 1);

    let parent = registry.lookup(pid(1)).unwrap();
    assert_eq!(parent.root().unwrap().to_path_buf(), PathBuf::from("/srv/rootfs"));

    registry.delete(pid(1)).unwrap();
    assert!(!root.is_alive());
    assert_eq!(root.ref_count(), 0);
}

#[test]
fn chroot_visible_through_shared_cell() {
    let mut registry = parent_and_child(CloneFlags::CLONE_FS | CloneFlags::CLONE_VM);

    registry
        .lookup_mut(pid(2))
        .unwrap()
        .set_root(PathBuf::from("/srv/jail"))
        .unwrap();

    let parent = registry.lookup(pid(1)).unwrap();
    assert_eq!(parent.root().unwrap().to_path_buf(), PathBuf::from("/srv/jail"));
}

#[test]
fn copies_are_independent_without_clone_fs() {
    let mut registry = parent_and_child(CloneFlags::empty());

    let child = registry.lookup_mut(pid(2)).unwrap();
    child.set_cwd(PathBuf::from("/tmp")).unwrap();
    child.set_exe(PathBuf::from("/bin/ls")).unwrap();

    let parent = registry.lookup(pid(1)).unwrap();
    assert_eq!(parent.cwd().unwrap().to_path_buf(), PathBuf::from("/home"));
    assert_eq!(parent.exe(), Some(Path::new("/bin/sh")));
    assert!(!parent.cwd().unwrap().is_shared());
}

#[test]
fn grandchild_copies_from_shared_cell() {
    let mut registry = parent_and_child(CloneFlags::CLONE_FS);

    registry
        .lookup_mut(pid(1))
        .unwrap()
        .set_cwd(PathBuf::from("/var"))
        .unwrap();
    registry.lookup_mut(pid(2)).unwrap().record_fork();

    registry.get_or_create(pid(3)).unwrap();
    registry.inherit_fs_info(pid(3), Some(pid(2))).unwrap();

    let grandchild = registry.lookup(pid(3)).unwrap();
    assert!(!grandchild.cwd().unwrap().is_shared());
    assert_eq!(grandchild.cwd().unwrap().to_path_buf(), PathBuf::from("/var"));

    let child = registry.lookup(pid(2)).unwrap();
    assert_eq!(child.cwd().unwrap().ref_count(), 2);
}

#[test]
fn uninitialized_parent_leaves_child_untouched() {
    let mut registry = Registry::default();
    registry.get_or_create(pid(1)).unwrap();
    registry.get_or_create(pid(2)).unwrap();

    let error = registry.inherit_fs_info(pid(2), Some(pid(1))).unwrap_err();

    assert!(matches!(
        error,
        Error::ProtocolViolation(Violation::ParentNotInitialized(parent)) if parent == pid(1)
    ));

    let child = registry.lookup(pid(2)).unwrap();
    assert!(child.exe().is_none());
    assert!(child.root().is_none());
    assert!(child.cwd().is_none());
}
