//! The process-wide source manager.
//!
//! Owns every open source (keyed by path) and the hot caches in front of
//! them: feature geodes and attribute records, each a bounded LRU. One
//! mutex guards the maps and both caches; cache probes and inserts are the
//! only critical sections, so selectors on different filters share a
//! source without stepping on each other.
//!
//! The manager is established once at startup and looked up (or passed)
//! explicitly; sources never refer back to it.

use crate::{Record, Source};
use anyhow::{Context, Result};
use geofuse_core::LimitedCache;
use geofuse_geometry::{Geode, NormBBox};
use parking_lot::Mutex;
use std::{
	collections::HashMap,
	sync::{Arc, OnceLock},
};

/// Default bound on cached geodes.
pub const GEODE_CACHE_ENTRIES: usize = 8192;
/// Default bound on cached attribute records.
pub const RECORD_CACHE_ENTRIES: usize = 8192;

/// Globally unique feature address: source, layer, feature.
///
/// Packs into a `u64` cache key as `(source:16)(layer:16)(feature:32)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniqueFeatureId {
	pub source_id: u16,
	pub layer: u16,
	pub feature_id: u32,
}

impl UniqueFeatureId {
	#[must_use]
	pub fn new(source_id: u16, layer: u16, feature_id: u32) -> Self {
		Self {
			source_id,
			layer,
			feature_id,
		}
	}

	fn cache_key(&self) -> u64 {
		(u64::from(self.source_id) << 48) | (u64::from(self.layer) << 32) | u64::from(self.feature_id)
	}
}

/// A shared handle to an opened source.
#[derive(Clone)]
pub struct SharedSource {
	id: u16,
	source: Arc<Source>,
}

impl SharedSource {
	pub fn id(&self) -> u16 {
		self.id
	}

	pub fn source(&self) -> &Arc<Source> {
		&self.source
	}

	pub fn num_features(&self, layer: u16) -> u32 {
		self.source.num_features(u32::from(layer))
	}
}

struct ManagerInner {
	sources: Vec<Arc<Source>>,
	by_path: HashMap<String, u16>,
	geode_cache: LimitedCache<u64, Arc<Geode>>,
	record_cache: LimitedCache<u64, Arc<Record>>,
}

/// Process-wide registry of sources with LRU caches in front.
pub struct SourceManager {
	inner: Mutex<ManagerInner>,
}

static GLOBAL: OnceLock<Arc<SourceManager>> = OnceLock::new();

impl SourceManager {
	#[must_use]
	pub fn new(geode_cache_entries: usize, record_cache_entries: usize) -> Arc<Self> {
		Arc::new(Self {
			inner: Mutex::new(ManagerInner {
				sources: Vec::new(),
				by_path: HashMap::new(),
				geode_cache: LimitedCache::with_max_entries(geode_cache_entries),
				record_cache: LimitedCache::with_max_entries(record_cache_entries),
			}),
		})
	}

	/// Install the process-wide manager. Later calls return the existing
	/// instance.
	pub fn init() -> Arc<Self> {
		GLOBAL
			.get_or_init(|| Self::new(GEODE_CACHE_ENTRIES, RECORD_CACHE_ENTRIES))
			.clone()
	}

	/// The installed process-wide manager; initializes with defaults if
	/// nobody called [`SourceManager::init`] yet.
	pub fn global() -> Arc<Self> {
		Self::init()
	}

	/// Register an opened source under a path key and return its handle.
	/// Registering the same path again returns the existing handle.
	pub fn register_source(&self, path_key: &str, source: Arc<Source>) -> SharedSource {
		let mut inner = self.inner.lock();
		if let Some(&id) = inner.by_path.get(path_key) {
			return SharedSource {
				id,
				source: inner.sources[id as usize].clone(),
			};
		}
		let id = inner.sources.len() as u16;
		inner.sources.push(source.clone());
		inner.by_path.insert(path_key.to_string(), id);
		log::debug!("registered source '{path_key}' as id {id}");
		SharedSource { id, source }
	}

	/// The shared handle for an already-registered path.
	pub fn try_get_shared_source(&self, path_key: &str) -> Option<SharedSource> {
		let inner = self.inner.lock();
		let &id = inner.by_path.get(path_key)?;
		Some(SharedSource {
			id,
			source: inner.sources[id as usize].clone(),
		})
	}

	fn source_for(&self, ufid: &UniqueFeatureId) -> Result<Arc<Source>> {
		let inner = self.inner.lock();
		inner
			.sources
			.get(ufid.source_id as usize)
			.cloned()
			.with_context(|| format!("unknown source id {}", ufid.source_id))
	}

	/// Fetch a feature's geometry through the geode cache.
	pub fn get_feature(&self, ufid: &UniqueFeatureId) -> Result<Arc<Geode>> {
		{
			let mut inner = self.inner.lock();
			if let Some(geode) = inner.geode_cache.get(&ufid.cache_key()) {
				return Ok(geode);
			}
		}
		let source = self.source_for(ufid)?;
		let geode = Arc::new(source.get_feature(u32::from(ufid.layer), ufid.feature_id)?);
		self.inner.lock().geode_cache.put(ufid.cache_key(), geode.clone());
		Ok(geode)
	}

	/// Fetch a feature's bounding box (uncached; the stores answer this
	/// from their index without decoding).
	pub fn get_feature_box(&self, ufid: &UniqueFeatureId) -> Result<NormBBox> {
		let source = self.source_for(ufid)?;
		source.get_feature_box(u32::from(ufid.layer), ufid.feature_id)
	}

	/// Fetch a feature's attribute record through the record cache.
	pub fn get_attribute(&self, ufid: &UniqueFeatureId) -> Result<Arc<Record>> {
		{
			let mut inner = self.inner.lock();
			if let Some(record) = inner.record_cache.get(&ufid.cache_key()) {
				return Ok(record);
			}
		}
		let source = self.source_for(ufid)?;
		let record = Arc::new(source.get_attribute(u32::from(ufid.layer), ufid.feature_id)?);
		self.inner.lock().record_cache.put(ufid.cache_key(), record.clone());
		Ok(record)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::source::test_support::build_point_source;

	#[test]
	fn registration_is_idempotent_per_path() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let source = build_point_source(dir.path(), 4)?;
		let manager = SourceManager::new(64, 64);

		let a = manager.register_source("path/a", source.clone());
		let b = manager.register_source("path/a", source.clone());
		assert_eq!(a.id(), b.id());

		let c = manager.register_source("path/c", source);
		assert_ne!(a.id(), c.id());

		assert!(manager.try_get_shared_source("path/a").is_some());
		assert!(manager.try_get_shared_source("path/x").is_none());
		Ok(())
	}

	#[test]
	fn cached_feature_access() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let source = build_point_source(dir.path(), 4)?;
		let manager = SourceManager::new(64, 64);
		let shared = manager.register_source("points", source);

		let ufid = UniqueFeatureId::new(shared.id(), 0, 2);
		let first = manager.get_feature(&ufid)?;
		let second = manager.get_feature(&ufid)?;
		assert!(Arc::ptr_eq(&first, &second));

		let record = manager.get_attribute(&ufid)?;
		assert_eq!(record.field_by_name("x"), Some(&crate::Value::Int(2)));

		let bbox = manager.get_feature_box(&ufid)?;
		assert!(bbox.valid());

		let missing = UniqueFeatureId::new(99, 0, 0);
		assert!(manager.get_feature(&missing).is_err());
		Ok(())
	}
}
