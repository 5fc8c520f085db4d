//! SOA serial tracking: the serial for a zone strictly increases across
//! publishes whose contents differ, and stays put otherwise.

use std::collections::HashMap;

/// `(domain, view)`.
pub type ZoneKey = (String, String);

#[derive(Default)]
pub struct SerialTable {
    last_serial: HashMap<ZoneKey, u32>,
    last_hash: HashMap<ZoneKey, [u8; 32]>,
}

impl SerialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the serial to use for `key` given the new body's content
    /// hash: unchanged from last publish ⇒ same serial (no bump); changed
    /// or first-seen ⇒ previous + 1 (starting at 1).
    pub fn next_serial(&mut self, key: ZoneKey, body_hash: [u8; 32]) -> u32 {
        if self.last_hash.get(&key) == Some(&body_hash) {
            return *self.last_serial.get(&key).unwrap_or(&1);
        }
        let serial = self.last_serial.get(&key).copied().unwrap_or(0) + 1;
        self.last_serial.insert(key.clone(), serial);
        self.last_hash.insert(key, body_hash);
        serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> [u8; 32] {
        let mut h = [0u8; 32];
        h[0] = byte;
        h
    }

    #[test]
    fn unchanged_content_keeps_serial() {
        let mut table = SerialTable::new();
        let key: ZoneKey = ("example.com".to_string(), "default".to_string());
        let first = table.next_serial(key.clone(), hash(1));
        let second = table.next_serial(key, hash(1));
        assert_eq!(first, second);
    }

    #[test]
    fn changed_content_advances_serial() {
        let mut table = SerialTable::new();
        let key: ZoneKey = ("example.com".to_string(), "default".to_string());
        let first = table.next_serial(key.clone(), hash(1));
        let second = table.next_serial(key, hash(2));
        assert!(second > first);
    }

    #[test]
    fn distinct_zones_track_independently() {
        let mut table = SerialTable::new();
        let a: ZoneKey = ("a.example.com".to_string(), "default".to_string());
        let b: ZoneKey = ("b.example.com".to_string(), "default".to_string());
        assert_eq!(table.next_serial(a, hash(1)), 1);
        assert_eq!(table.next_serial(b, hash(1)), 1);
    }
}
