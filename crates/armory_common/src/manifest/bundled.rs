//! Manifest compiled into the binary
//!
//! Last resort when there is no network and no cache. It is never written
//! to the cache, so a later successful fetch always wins over it.

pub const BUNDLED_MANIFEST: &str = include_str!("../../data/bundled_manifest.json");

pub fn body() -> &'static [u8] {
    BUNDLED_MANIFEST.as_bytes()
}
