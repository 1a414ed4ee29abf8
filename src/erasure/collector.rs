//! Incremental shard collection and reconstruction
//!
//! Shards for one transaction arrive out of order from several sources.
//! A [`ShardCollector`] stores them until enough are present to rebuild
//! the data; [`CollectorRegistry`] keeps one collector per transaction and
//! serialises access to each.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::reed_solomon::ReedSolomon;
use super::sizing::ShardGeometry;

/// Lifecycle of a collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// No shard received yet
    Uninitialized,
    /// Receiving shards
    Collecting,
    /// Data rebuilt from the received shards
    Reconstructed,
}

/// Shards received so far for one transaction
#[derive(Debug)]
pub struct ShardCollector {
    state: CollectorState,
    geometry: Option<ShardGeometry>,
    shards: Vec<Vec<u8>>,
    present: Vec<bool>,
    received: usize,
    data: Option<Vec<u8>>,
    created_at: Instant,
}

impl Default for ShardCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardCollector {
    pub fn new() -> Self {
        ShardCollector {
            state: CollectorState::Uninitialized,
            geometry: None,
            shards: Vec::new(),
            present: Vec::new(),
            received: 0,
            data: None,
            created_at: Instant::now(),
        }
    }

    /// Store the shard at `index`.
    ///
    /// A geometry whose shard length or total count differs from the stored
    /// one starts collection over. Returns `true` if the shard was new,
    /// `false` for a duplicate.
    pub fn set_shard(
        &mut self,
        index: usize,
        bytes: &[u8],
        geometry: ShardGeometry,
    ) -> Result<bool> {
        geometry.validate()?;
        if index >= geometry.total_shards {
            return Err(Error::IndexOutOfRange {
                index,
                len: geometry.total_shards,
            });
        }
        if bytes.len() != geometry.shard_len {
            return Err(Error::DimensionMismatch(format!(
                "shard {} has length {}, expected {}",
                index,
                bytes.len(),
                geometry.shard_len
            )));
        }

        let stale = match &self.geometry {
            None => true,
            Some(current) => {
                current.shard_len != geometry.shard_len
                    || current.total_shards != geometry.total_shards
            }
        };
        if stale {
            if self.geometry.is_some() {
                warn!(
                    discarded = self.received,
                    "Shard geometry changed, discarding partial state"
                );
            }
            self.reset(geometry);
        }

        if self.present[index] {
            return Ok(false);
        }
        self.shards[index].copy_from_slice(bytes);
        self.present[index] = true;
        self.received += 1;
        Ok(true)
    }

    /// Whether at least `data_shards` shards are present
    pub fn enough_shards_received(&self) -> bool {
        match &self.geometry {
            Some(geometry) => self.received >= geometry.data_shards,
            None => false,
        }
    }

    /// Rebuild the data from the received shards.
    ///
    /// Returns `Ok(false)` while too few shards are present. Calling again
    /// after success re-derives the same data.
    pub fn reconstruct(&mut self) -> Result<bool> {
        let geometry = match self.geometry {
            Some(geometry) if self.enough_shards_received() => geometry,
            _ => return Ok(false),
        };

        let rs = ReedSolomon::new(geometry.data_shards, geometry.parity_shards)?;
        rs.decode_missing(&mut self.shards, &self.present, 0, geometry.shard_len)?;
        self.data = Some(self.shards[..geometry.data_shards].concat());
        self.state = CollectorState::Reconstructed;

        debug!(
            received = self.received,
            total = geometry.total_shards,
            "Reconstructed data from shards"
        );
        Ok(true)
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn geometry(&self) -> Option<ShardGeometry> {
        self.geometry
    }

    pub fn received_count(&self) -> usize {
        self.received
    }

    /// Presence flag per shard index
    pub fn presence(&self) -> &[bool] {
        &self.present
    }

    /// Reconstructed data shards, concatenated (still padded)
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Time since collection started for the current geometry
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn reset(&mut self, geometry: ShardGeometry) {
        self.state = CollectorState::Collecting;
        self.shards = vec![vec![0u8; geometry.shard_len]; geometry.total_shards];
        self.present = vec![false; geometry.total_shards];
        self.received = 0;
        self.data = None;
        self.geometry = Some(geometry);
        self.created_at = Instant::now();
    }
}

/// One collector per in-flight transaction
pub struct CollectorRegistry<K> {
    collectors: DashMap<K, Arc<Mutex<ShardCollector>>>,
}

impl<K> Default for CollectorRegistry<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> CollectorRegistry<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        CollectorRegistry {
            collectors: DashMap::new(),
        }
    }

    /// Feed one shard for `key`.
    ///
    /// Returns the reconstructed (padded) data the first time enough shards
    /// are present, and `None` before and after that.
    pub fn submit(
        &self,
        key: K,
        index: usize,
        bytes: &[u8],
        geometry: ShardGeometry,
    ) -> Result<Option<Vec<u8>>> {
        let collector = self
            .collectors
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(ShardCollector::new())))
            .clone();

        let mut collector = collector.lock();
        collector.set_shard(index, bytes, geometry)?;

        if collector.state() == CollectorState::Reconstructed {
            return Ok(None);
        }
        if collector.reconstruct()? {
            return Ok(collector.data().map(|d| d.to_vec()));
        }
        Ok(None)
    }

    /// State of the collector for `key`, if any
    pub fn state(&self, key: &K) -> Option<CollectorState> {
        self.collectors.get(key).map(|c| c.lock().state())
    }

    /// Remove and return the reconstructed data for `key`
    pub fn take(&self, key: &K) -> Option<Vec<u8>> {
        let (_, collector) = self.collectors.remove(key)?;
        let collector = collector.lock();
        collector.data().map(|d| d.to_vec())
    }

    /// Drop collectors older than `max_age`. Returns how many were dropped.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let before = self.collectors.len();
        self.collectors.retain(|_, c| c.lock().age() < max_age);
        let evicted = before.saturating_sub(self.collectors.len());
        if evicted > 0 {
            info!(evicted, "Evicted abandoned shard collectors");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erasure::sizing::{encode_payload, strip_padding};

    fn encoded(payload: &[u8], servers: usize) -> (ShardGeometry, Vec<Vec<u8>>) {
        encode_payload(payload, servers).unwrap()
    }

    #[test]
    fn test_new_collector() {
        let collector = ShardCollector::new();
        assert_eq!(collector.state(), CollectorState::Uninitialized);
        assert!(!collector.enough_shards_received());
        assert!(collector.data().is_none());
    }

    #[test]
    fn test_reconstruct_out_of_order() {
        let payload: Vec<u8> = (0..300).map(|i| (i % 13) as u8).collect();
        let (geometry, shards) = encoded(&payload, 3);
        let mut collector = ShardCollector::new();

        for index in [5, 3, 1] {
            assert!(collector.set_shard(index, &shards[index], geometry).unwrap());
        }
        assert_eq!(collector.state(), CollectorState::Collecting);
        assert!(collector.enough_shards_received());

        assert!(collector.reconstruct().unwrap());
        assert_eq!(collector.state(), CollectorState::Reconstructed);
        assert_eq!(strip_padding(collector.data().unwrap()).unwrap(), payload.as_slice());
    }

    #[test]
    fn test_not_enough_shards() {
        let (geometry, shards) = encoded(b"payload", 3);
        let mut collector = ShardCollector::new();
        collector.set_shard(0, &shards[0], geometry).unwrap();

        assert!(!collector.reconstruct().unwrap());
        assert_eq!(collector.state(), CollectorState::Collecting);
    }

    #[test]
    fn test_duplicate_is_ignored() {
        let (geometry, shards) = encoded(b"payload", 3);
        let mut collector = ShardCollector::new();
        assert!(collector.set_shard(2, &shards[2], geometry).unwrap());
        assert!(!collector.set_shard(2, &shards[2], geometry).unwrap());
        assert_eq!(collector.received_count(), 1);
    }

    #[test]
    fn test_geometry_change_resets() {
        let (geometry_a, shards_a) = encoded(b"first transaction", 3);
        let (geometry_b, shards_b) = encoded(&[9u8; 600], 3);
        assert_ne!(geometry_a.total_shards, geometry_b.total_shards);

        let mut collector = ShardCollector::new();
        collector.set_shard(0, &shards_a[0], geometry_a).unwrap();
        collector.set_shard(1, &shards_a[1], geometry_a).unwrap();
        assert_eq!(collector.received_count(), 2);

        collector.set_shard(4, &shards_b[4], geometry_b).unwrap();
        assert_eq!(collector.received_count(), 1);
        assert_eq!(collector.geometry(), Some(geometry_b));
        assert_eq!(collector.presence().iter().filter(|p| **p).count(), 1);
    }

    #[test]
    fn test_geometry_change_restarts_age() {
        let (geometry_a, shards_a) = encoded(b"first transaction", 3);
        let (geometry_b, shards_b) = encoded(&[9u8; 600], 3);

        let mut collector = ShardCollector::new();
        collector.set_shard(0, &shards_a[0], geometry_a).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let aged = collector.age();
        assert!(aged >= Duration::from_millis(50));

        collector.set_shard(0, &shards_b[0], geometry_b).unwrap();
        assert!(collector.age() < aged);

        // A shard for the current geometry keeps the age running
        std::thread::sleep(Duration::from_millis(10));
        let before = collector.age();
        collector.set_shard(1, &shards_b[1], geometry_b).unwrap();
        assert!(collector.age() >= before);
    }

    #[test]
    fn test_rejects_bad_index_and_length() {
        let (geometry, shards) = encoded(b"payload", 3);
        let mut collector = ShardCollector::new();
        assert!(matches!(
            collector.set_shard(geometry.total_shards, &shards[0], geometry),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            collector.set_shard(0, &shards[0][1..], geometry),
            Err(Error::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let (geometry, shards) = encoded(b"idempotent", 2);
        let mut collector = ShardCollector::new();
        for index in 1..geometry.total_shards {
            collector.set_shard(index, &shards[index], geometry).unwrap();
        }
        assert!(collector.reconstruct().unwrap());
        let first = collector.data().unwrap().to_vec();
        assert!(collector.reconstruct().unwrap());
        assert_eq!(collector.data().unwrap(), first.as_slice());
    }

    #[test]
    fn test_registry_returns_data_once() {
        let payload: Vec<u8> = (0..300).map(|i| (i * 7 % 256) as u8).collect();
        let (geometry, shards) = encoded(&payload, 3);
        let registry: CollectorRegistry<u64> = CollectorRegistry::new();

        assert!(registry.submit(7, 0, &shards[0], geometry).unwrap().is_none());
        assert!(registry.submit(7, 4, &shards[4], geometry).unwrap().is_none());
        let data = registry.submit(7, 2, &shards[2], geometry).unwrap().unwrap();
        assert_eq!(strip_padding(&data).unwrap(), payload.as_slice());

        // Later arrivals do not trigger another reconstruction
        assert!(registry.submit(7, 5, &shards[5], geometry).unwrap().is_none());
        assert_eq!(registry.state(&7), Some(CollectorState::Reconstructed));

        let taken = registry.take(&7).unwrap();
        assert_eq!(taken, data);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_concurrent_submissions() {
        let payload: Vec<u8> = (0..900).map(|i| (i % 251) as u8).collect();
        let (geometry, shards) = encoded(&payload, 3);
        let registry: Arc<CollectorRegistry<&'static str>> = Arc::new(CollectorRegistry::new());

        let handles: Vec<_> = shards
            .into_iter()
            .enumerate()
            .map(|(index, shard)| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.submit("tx", index, &shard, geometry).unwrap())
            })
            .collect();

        let results: Vec<Option<Vec<u8>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        let rebuilt: Vec<&Vec<u8>> = results.iter().flatten().collect();
        assert_eq!(rebuilt.len(), 1);
        assert_eq!(strip_padding(rebuilt[0]).unwrap(), payload.as_slice());
    }

    #[test]
    fn test_registry_evicts_stale() {
        let (geometry, shards) = encoded(b"stale", 3);
        let registry: CollectorRegistry<u32> = CollectorRegistry::new();
        registry.submit(1, 0, &shards[0], geometry).unwrap();
        registry.submit(2, 0, &shards[0], geometry).unwrap();

        assert_eq!(registry.evict_stale(Duration::from_secs(3600)), 0);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.evict_stale(Duration::ZERO), 2);
        assert!(registry.is_empty());
    }
}
