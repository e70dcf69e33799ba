//! Hash collection re-exports used by the runtime.
//!
//! Runtime maps are keyed by bundle identifiers and asset paths and never
//! iterated for output, so the faster AHash hasher is used. Anything whose
//! iteration order reaches a file on disk uses `BTreeMap` instead.

// Re-export optimized hash collections
pub use ahash::{AHashMap as HashMap, AHashSet as HashSet, RandomState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_ahash() {
        let mut map = HashMap::new();
        map.insert("key", "value");
        assert_eq!(map.get("key"), Some(&"value"));
    }

    #[test]
    fn test_hashset_ahash() {
        let mut set = HashSet::new();
        set.insert(42);
        assert!(set.contains(&42));
    }
}
