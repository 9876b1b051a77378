//! Memoization of registration and fusion results.

use std::collections::HashMap;

use tracing::debug;

use crate::fusion::FusionPolicy;
use crate::pipeline::config::AlignmentConfig;
use crate::store::FrameSet;

/// The pipeline stage a cached value belongs to, with every parameter that
/// changes its output.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StageKey {
    Aligned(AlignmentConfig),
    /// Average of the raw frames (`None`) or of a registration.
    Average { aligned: Option<AlignmentConfig> },
    Fused {
        policy: FusionPolicy,
        aligned: Option<AlignmentConfig>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub set: FrameSet,
    pub stage: StageKey,
    /// Mask version the value was computed with; `None` when no mask took
    /// part.
    pub mask_version: Option<u64>,
}

impl CacheKey {
    pub fn new(set: FrameSet, stage: StageKey, mask_version: Option<u64>) -> Self {
        Self {
            set,
            stage,
            mask_version,
        }
    }

    pub fn depends_on_mask(&self) -> bool {
        self.mask_version.is_some()
    }
}

/// Key → value map that computes on miss and never recomputes on hit.
#[derive(Debug)]
pub struct ResultCache<V> {
    entries: HashMap<CacheKey, V>,
    hits: u64,
    misses: u64,
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<V: Clone> ResultCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Returns the stored value for `key`, running `producer` only on a
    /// miss.
    pub fn get_or_compute<F>(&mut self, key: CacheKey, producer: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.entries.get(&key) {
            self.hits += 1;
            debug!(?key, "Cache hit");
            return v.clone();
        }
        self.misses += 1;
        debug!(?key, "Cache miss");
        let value = producer();
        self.entries.insert(key, value.clone());
        value
    }

    /// Drops every entry whose key matches. Returns how many were dropped.
    pub fn invalidate<P>(&mut self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|k, _| !predicate(k));
        before - self.entries.len()
    }

    /// Drops entries computed with any mask; mask-independent entries stay.
    pub fn invalidate_mask_dependent(&mut self) -> usize {
        self.invalidate(CacheKey::depends_on_mask)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(mask: Option<u64>) -> CacheKey {
        CacheKey::new(
            FrameSet::Preview,
            StageKey::Aligned(AlignmentConfig::default()),
            mask,
        )
    }

    #[test]
    fn test_producer_runs_once_per_key() {
        let mut cache = ResultCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            let v = cache.get_or_compute(key(None), || {
                calls += 1;
                42
            });
            assert_eq!(v, 42);
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_invalidate_mask_dependent_keeps_others() {
        let mut cache = ResultCache::new();
        cache.get_or_compute(key(None), || 1);
        cache.get_or_compute(key(Some(3)), || 2);
        cache.get_or_compute(
            CacheKey::new(
                FrameSet::Full,
                StageKey::Fused {
                    policy: FusionPolicy::Light,
                    aligned: None,
                },
                None,
            ),
            || 3,
        );
        assert_eq!(cache.invalidate_mask_dependent(), 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(None)), Some(1));
    }

    #[test]
    fn test_parameters_are_part_of_key() {
        let a = StageKey::Fused {
            policy: FusionPolicy::FarthestFromAverage { threshold: 10 },
            aligned: None,
        };
        let b = StageKey::Fused {
            policy: FusionPolicy::FarthestFromAverage { threshold: 11 },
            aligned: None,
        };
        let mut cache = ResultCache::new();
        cache.get_or_compute(CacheKey::new(FrameSet::Full, a, None), || 'a');
        let v = cache.get_or_compute(CacheKey::new(FrameSet::Full, b, None), || 'b');
        assert_eq!(v, 'b');
        assert_eq!(cache.len(), 2);
    }
}
