//! Shared register table.
//!
//! Every rule with the same OSC address template and type signature shares
//! one vector of last-observed argument values. A rule only holds the key; the
//! table itself is owned by whoever owns the rules (usually a `RuleSet`).
//! Vectors are created on first use and never shrink.

use hashbrown::HashMap;

/// Stable key derived from an address template and a type signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterKey(u64);

impl RegisterKey {
    pub fn new(path_template: &str, types: &str) -> Self {
        let hash = fnv1a_64(FNV_OFFSET, path_template.as_bytes());
        let hash = fnv1a_64(hash, &[0]);
        Self(fnv1a_64(hash, types.as_bytes()))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

const fn fnv1a_64(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

#[derive(Debug, Default, Clone)]
pub struct RegisterTable {
    vectors: HashMap<RegisterKey, Vec<f32>>,
}

impl RegisterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the vector for `key`, growing it to at least `len`.
    pub fn bind(&mut self, key: RegisterKey, len: usize) -> &mut [f32] {
        let values = self.vectors.entry(key).or_default();
        if values.len() < len {
            values.resize(len, 0.0);
        }
        values
    }

    pub fn get(&self, key: RegisterKey) -> Option<&[f32]> {
        self.vectors.get(&key).map(Vec::as_slice)
    }

    /// Number of distinct vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_and_separated() {
        assert_eq!(RegisterKey::new("/a/{i}", "if"), RegisterKey::new("/a/{i}", "if"));
        assert_ne!(RegisterKey::new("/a/{i}", "if"), RegisterKey::new("/a/{i}", "fi"));
        // The separator keeps path and types apart.
        assert_ne!(RegisterKey::new("/ab", "i"), RegisterKey::new("/a", "bi"));
    }

    #[test]
    fn test_bind_shares_and_grows() {
        let mut table = RegisterTable::new();
        let key = RegisterKey::new("/x", "ii");

        table.bind(key, 2)[1] = 7.0;
        assert_eq!(table.bind(key, 2)[1], 7.0);
        assert_eq!(table.len(), 1);

        assert_eq!(table.bind(key, 4).len(), 4);
        assert_eq!(table.bind(key, 1).len(), 4, "vectors never shrink");
        assert_eq!(table.get(key), Some(&[0.0, 7.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_missing_key() {
        let table = RegisterTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get(RegisterKey::new("/nope", "")), None);
    }
}
