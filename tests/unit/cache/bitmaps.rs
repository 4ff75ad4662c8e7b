use super::*;
use crate::command::fingerprint::hash_cmd;
use crate::command::request::RenderCmd;
use crate::foundation::core::ImageSize;

fn key(name: &str) -> CacheKey {
    let cmd = RenderCmd::new(["d.rast", &format!("map={name}")]).unwrap();
    hash_cmd(&cmd, None)
}

fn bitmap(v: u8) -> Bitmap {
    Bitmap::filled(ImageSize::new(2, 2).unwrap(), [v, v, v, 255])
}

#[test]
fn sentinel_lives_under_reserved_key() {
    let mut cache = BitmapCache::new();
    assert!(cache.sentinel().is_none());

    cache.set_sentinel(bitmap(1));
    cache.set_sentinel(bitmap(2));
    assert_eq!(cache.sentinel(), Some(&bitmap(2)));
    assert_eq!(cache.get(CacheKey::NO_DATA), Some(&bitmap(2)));
}

#[test]
fn sweep_drops_unreferenced_but_never_the_sentinel() {
    let mut cache = BitmapCache::new();
    cache.set_sentinel(bitmap(0));
    cache.release(CacheKey::NO_DATA).unwrap();
    cache.release(CacheKey::NO_DATA).unwrap_err();

    let live = key("live");
    let dead = key("dead");
    cache.put(live, bitmap(1));
    cache.put(dead, bitmap(2));
    cache.retain(dead).unwrap();
    cache.release(dead).unwrap();
    cache.release(dead).unwrap();

    assert_eq!(cache.sweep(), 1);
    assert!(cache.contains(live));
    assert!(!cache.contains(dead));
    assert!(cache.sentinel().is_some());
    assert_eq!(cache.len(), 2);
}
