//! Local storage of `(keyword, key, value)` records.

use std::fmt::Debug;
use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;

/// Default maximum number of keywords held by [MemoryStorage].
pub const DEFAULT_MAX_KEYWORDS: usize = 1000;

/// Storage backend for values this node is responsible for.
///
/// Records are grouped by keyword, and a keyword may hold many `(key, value)` pairs.
pub trait Storage: Debug + Send {
    /// Store a value, overwriting any value previously stored under the same keyword and key.
    fn put(&mut self, keyword: Bytes, key: Bytes, value: Bytes);

    /// The value stored under this keyword and key, if any.
    fn get(&self, keyword: &[u8], key: &[u8]) -> Option<Bytes>;

    /// Every `(key, value)` pair stored under this keyword, in insertion order.
    fn get_all(&self, keyword: &[u8]) -> Vec<(Bytes, Bytes)>;

    /// Remove the value stored under this keyword and key, if any.
    fn delete(&mut self, keyword: &[u8], key: &[u8]);

    /// Every stored `(keyword, key, value)` record.
    fn records(&self) -> Vec<(Bytes, Bytes, Bytes)>;
}

#[derive(Debug)]
/// In memory [Storage], evicting the least recently written keyword once full.
pub struct MemoryStorage {
    keywords: LruCache<Bytes, Vec<(Bytes, Bytes)>>,
}

impl MemoryStorage {
    pub fn new(max_keywords: NonZeroUsize) -> Self {
        Self {
            keywords: LruCache::new(max_keywords),
        }
    }

    /// Number of keywords currently stored.
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_MAX_KEYWORDS).unwrap_or(NonZeroUsize::MIN))
    }
}

impl Storage for MemoryStorage {
    fn put(&mut self, keyword: Bytes, key: Bytes, value: Bytes) {
        if let Some(pairs) = self.keywords.get_mut(&keyword) {
            match pairs.iter_mut().find(|(k, _)| k == &key) {
                Some(pair) => pair.1 = value,
                None => pairs.push((key, value)),
            }

            return;
        }

        self.keywords.put(keyword, vec![(key, value)]);
    }

    fn get(&self, keyword: &[u8], key: &[u8]) -> Option<Bytes> {
        self.keywords
            .peek(keyword)?
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, value)| value.clone())
    }

    fn get_all(&self, keyword: &[u8]) -> Vec<(Bytes, Bytes)> {
        self.keywords.peek(keyword).cloned().unwrap_or_default()
    }

    fn delete(&mut self, keyword: &[u8], key: &[u8]) {
        let now_empty = match self.keywords.peek_mut(keyword) {
            Some(pairs) => {
                pairs.retain(|(k, _)| k.as_ref() != key);
                pairs.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.keywords.pop(keyword);
        }
    }

    fn records(&self) -> Vec<(Bytes, Bytes, Bytes)> {
        self.keywords
            .iter()
            .flat_map(|(keyword, pairs)| {
                pairs
                    .iter()
                    .map(|(key, value)| (keyword.clone(), key.clone(), value.clone()))
            })
            .collect()
    }
}
