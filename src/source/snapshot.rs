//! The full desired configuration at one point in time.

use std::collections::BTreeMap;

/// Relative file name → file content.
///
/// Values are opaque bytes; equality is structural over every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), content.into());
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (key, content) in iter {
            snapshot.insert(key, content);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_is_structural() {
        let a: Snapshot = [("a.conf", "x=1"), ("b.conf", "y=2")].into_iter().collect();
        let b: Snapshot = [("b.conf", "y=2"), ("a.conf", "x=1")].into_iter().collect();
        assert_eq!(a, b);

        let c: Snapshot = [("a.conf", "x=2"), ("b.conf", "y=2")].into_iter().collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_binary_content() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("blob.bin", vec![0u8, 159, 146, 150]);
        assert_eq!(snapshot.get("blob.bin"), Some(&[0u8, 159, 146, 150][..]));
        assert_eq!(snapshot.len(), 1);
    }
}
