use super::*;

#[test]
fn created_dirs_are_unique_and_removed_on_drop() {
    let a = ScratchDir::create().unwrap();
    let b = ScratchDir::create().unwrap();
    assert_ne!(a.path(), b.path());
    std::fs::write(a.path().join("x.ppm"), b"data").unwrap();

    let path = a.path().to_path_buf();
    drop(a);
    assert!(!path.exists());
}

#[test]
fn keep_leaves_the_directory() {
    let mut dir = ScratchDir::create().unwrap();
    dir.keep();
    let path = dir.path().to_path_buf();
    drop(dir);
    assert!(path.is_dir());
    std::fs::remove_dir_all(path).unwrap();
}

#[test]
fn adopted_existing_dirs_survive_drop() {
    let outer = tempfile::tempdir().unwrap();
    let existing = ScratchDir::at(outer.path()).unwrap();
    drop(existing);
    assert!(outer.path().is_dir());

    let nested = outer.path().join("a/b");
    let created = ScratchDir::at(&nested).unwrap();
    assert!(nested.is_dir());
    drop(created);
    assert!(!nested.exists());
}
