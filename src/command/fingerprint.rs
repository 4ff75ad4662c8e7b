use std::fmt;
use std::str::FromStr;

use xxhash_rust::xxh3::Xxh3;

use crate::command::request::{Region, RenderCmd};
use crate::foundation::error::MapAnimError;

const XXH3_SEED: u64 = 0x5a1d_73c4_e0b9_2f61;

// Domain tags keep single-command, command-list and stack keys disjoint, so a key can only ever
// live in one of the caches.
const TAG_CMD: u8 = b'C';
const TAG_CMDS: u8 = b'L';
const TAG_STACK: u8 = b'S';

/// Content-addressed cache key (128-bit xxh3 digest).
///
/// Displayed as 32 lowercase hex digits, which is also the file stem of artifacts produced for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(u128);

impl CacheKey {
    /// Reserved key of the permanent "no data" bitmap. Never produced by hashing.
    pub const NO_DATA: Self = Self(0);

    /// Whether this is the reserved "no data" key.
    pub fn is_no_data(self) -> bool {
        self == Self::NO_DATA
    }

    /// Raw digest value.
    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for CacheKey {
    type Err = MapAnimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(MapAnimError::validation(format!(
                "cache key must be 32 hex digits, got '{s}'"
            )));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| MapAnimError::validation(format!("invalid cache key '{s}': {e}")))
    }
}

impl serde::Serialize for CacheKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for CacheKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Key of one rendered layer file.
pub fn hash_cmd(cmd: &RenderCmd, region: Option<&Region>) -> CacheKey {
    let mut h = StableHasher::new(TAG_CMD);
    write_cmd(&mut h, cmd);
    write_region(&mut h, region);
    h.finish()
}

/// Key of an ordered command list. Used for 3D view bitmaps (`[cmd]`, no region).
pub fn hash_cmds(cmds: &[RenderCmd], region: Option<&Region>) -> CacheKey {
    let mut h = StableHasher::new(TAG_CMDS);
    h.write_u64(cmds.len() as u64);
    for cmd in cmds {
        write_cmd(&mut h, cmd);
    }
    write_region(&mut h, region);
    h.finish()
}

/// Key of a composed frame: the ordered layer commands, their opacities and the region.
pub fn hash_stack(cmds: &[RenderCmd], opacities: &[f64], region: Option<&Region>) -> CacheKey {
    let mut h = StableHasher::new(TAG_STACK);
    h.write_u64(cmds.len() as u64);
    for cmd in cmds {
        write_cmd(&mut h, cmd);
    }
    h.write_u64(opacities.len() as u64);
    for &o in opacities {
        // -0.0 and 0.0 are the same opacity.
        h.write_u64(if o == 0.0 { 0 } else { o.to_bits() });
    }
    write_region(&mut h, region);
    h.finish()
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new(tag: u8) -> Self {
        let mut h = Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        };
        h.write_bytes(&[tag]);
        h
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> CacheKey {
        match self.inner.digest128() {
            0 => CacheKey(1),
            v => CacheKey(v),
        }
    }
}

fn write_cmd(h: &mut StableHasher, cmd: &RenderCmd) {
    h.write_u64(cmd.argv().len() as u64);
    for a in cmd.argv() {
        h.write_str(a);
    }
}

fn write_region(h: &mut StableHasher, region: Option<&Region>) {
    match region {
        None => h.write_bytes(&[0]),
        Some(r) => {
            h.write_bytes(&[1]);
            let entries = r.iter().collect::<Vec<_>>();
            h.write_u64(entries.len() as u64);
            for (k, v) in entries {
                h.write_str(k);
                h.write_str(v);
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/command/fingerprint.rs"]
mod tests;
