//! A size-bounded LRU cache.

use anyhow::Result;
use lru::LruCache;
use std::{hash::Hash, num::NonZeroUsize};

/// Least-recently-used cache bounded by element count.
///
/// The source manager keeps a few thousand geodes and attribute records hot
/// with these; eviction is automatic on insert.
pub struct LimitedCache<K, V> {
	cache: LruCache<K, V>,
}

impl<K: Eq + Hash, V: Clone> LimitedCache<K, V> {
	/// Create a cache holding at most `max_entries` elements.
	///
	/// # Panics
	/// Panics if `max_entries` is zero.
	#[must_use]
	pub fn with_max_entries(max_entries: usize) -> Self {
		Self {
			cache: LruCache::new(NonZeroUsize::new(max_entries).expect("cache capacity must be non-zero")),
		}
	}

	/// Fetch a clone of the cached value, marking it most recently used.
	pub fn get(&mut self, key: &K) -> Option<V> {
		self.cache.get(key).cloned()
	}

	/// Fetch the cached value or produce, store and return it.
	pub fn get_or_insert_with<F>(&mut self, key: K, produce: F) -> Result<V>
	where
		F: FnOnce() -> Result<V>,
	{
		if let Some(value) = self.cache.get(&key) {
			return Ok(value.clone());
		}
		let value = produce()?;
		self.cache.put(key, value.clone());
		Ok(value)
	}

	pub fn put(&mut self, key: K, value: V) {
		self.cache.put(key, value);
	}

	pub fn len(&self) -> usize {
		self.cache.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cache.is_empty()
	}

	pub fn clear(&mut self) {
		self.cache.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn evicts_least_recently_used() {
		let mut cache = LimitedCache::with_max_entries(2);
		cache.put(1, "a");
		cache.put(2, "b");
		assert_eq!(cache.get(&1), Some("a")); // 1 becomes most recent
		cache.put(3, "c"); // evicts 2
		assert_eq!(cache.get(&2), None);
		assert_eq!(cache.get(&1), Some("a"));
		assert_eq!(cache.get(&3), Some("c"));
	}

	#[test]
	fn get_or_insert_only_produces_on_miss() -> Result<()> {
		let mut cache = LimitedCache::with_max_entries(4);
		let mut calls = 0;
		for _ in 0..3 {
			let v = cache.get_or_insert_with(7, || {
				calls += 1;
				Ok(70)
			})?;
			assert_eq!(v, 70);
		}
		assert_eq!(calls, 1);
		Ok(())
	}
}
