use super::*;
use crate::command::fingerprint::hash_cmd;
use crate::command::request::RenderCmd;

fn key(name: &str) -> CacheKey {
    let cmd = RenderCmd::new(["d.rast", &format!("map={name}")]).unwrap();
    hash_cmd(&cmd, None)
}

fn touch(path: &Path) {
    std::fs::write(path, b"P6\n1 1\n255\n\0\0\0").unwrap();
}

#[test]
fn artifact_path_uses_hex_key_stem() {
    let k = key("elev");
    let p = artifact_path(Path::new("/tmp/x"), k, LAYER_EXT);
    assert_eq!(p, Path::new("/tmp/x").join(format!("{k}.ppm")));
}

#[test]
fn freshness_requires_size_match_and_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("elev");
    let path = artifact_path(dir.path(), k, LAYER_EXT);
    let size = ImageSize::new(4, 3).unwrap();

    let mut cache = FileCache::new();
    assert!(!cache.is_fresh(k, size));

    cache.put(k, path.clone(), size);
    assert!(!cache.is_fresh(k, size), "file not written yet");

    touch(&path);
    assert!(cache.is_fresh(k, size));
    assert!(!cache.is_fresh(k, ImageSize::new(8, 6).unwrap()));
    assert_eq!(cache.size(k), Some(size));
    assert_eq!(cache.get(k), Some(path.as_path()));
}

#[test]
fn sweep_deletes_unreferenced_files_and_mask_sidecars() {
    let dir = tempfile::tempdir().unwrap();
    let size = ImageSize::new(1, 1).unwrap();
    let live = key("live");
    let dead = key("dead");
    let live_path = artifact_path(dir.path(), live, LAYER_EXT);
    let dead_path = artifact_path(dir.path(), dead, LAYER_EXT);
    let dead_mask = artifact_path(dir.path(), dead, MASK_EXT);
    touch(&live_path);
    touch(&dead_path);
    touch(&dead_mask);

    let mut cache = FileCache::new();
    cache.put(live, live_path.clone(), size);
    cache.put(dead, dead_path.clone(), size);
    cache.release(dead).unwrap();

    assert_eq!(cache.sweep(), 1);
    assert!(live_path.exists());
    assert!(!dead_path.exists());
    assert!(!dead_mask.exists());
    assert_eq!(cache.size(dead), None);
    assert_eq!(cache.len(), 1);
}

#[test]
fn sweep_tolerates_files_already_gone() {
    let dir = tempfile::tempdir().unwrap();
    let k = key("gone");
    let mut cache = FileCache::new();
    cache.put(
        k,
        artifact_path(dir.path(), k, LAYER_EXT),
        ImageSize::new(1, 1).unwrap(),
    );
    cache.release(k).unwrap();

    assert_eq!(cache.sweep(), 1);
    assert!(cache.is_empty());
}
