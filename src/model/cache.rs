use crate::errors::EngineResult;
use crate::model::binomial::call_price;
use crate::model::TreeParams;
use std::collections::HashMap;

/// Memo key: the exact bit patterns of all eight pricing inputs.
/// Bit-exact keying is what the pricer's referential transparency
/// licenses; near-equal floats are distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceKey([u64; 8]);

impl PriceKey {
    #[inline]
    fn of(params: &TreeParams) -> Self {
        Self([
            params.spot.to_bits(),
            params.strike.to_bits(),
            params.rate.to_bits(),
            params.tenor_years.to_bits(),
            params.sigma.to_bits(),
            params.beta.to_bits(),
            params.time_step.to_bits(),
            params.alpha.to_bits(),
        ])
    }
}

/// Cache in front of the pure pricer. Entries never invalidate: a given
/// key has exactly one possible value. Owned by the engine task, so no
/// locking.
#[derive(Debug, Default)]
pub struct PriceCache {
    entries: HashMap<PriceKey, f64>,
    pub hits: u64,
    pub misses: u64,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price through the cache. Pricing errors are returned, not cached.
    pub fn price(&mut self, params: &TreeParams) -> EngineResult<f64> {
        let key = PriceKey::of(params);
        if let Some(&value) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(value);
        }
        let value = call_price(params)?;
        self.entries.insert(key, value);
        self.misses += 1;
        Ok(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(sigma: f64) -> TreeParams {
        TreeParams {
            spot: 100.0,
            strike: 100.0,
            rate: 0.02,
            tenor_years: 1.0,
            sigma,
            beta: 1.0,
            time_step: 0.1,
            alpha: 1.0,
        }
    }

    #[test]
    fn test_second_lookup_hits() {
        let mut cache = PriceCache::new();
        let first = cache.price(&params(0.2)).unwrap();
        let second = cache.price(&params(0.2)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.hits, 1);
        assert_eq!(cache.misses, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_inputs_are_distinct_keys() {
        let mut cache = PriceCache::new();
        cache.price(&params(0.2)).unwrap();
        cache.price(&params(0.2 + 1e-15)).unwrap();
        assert_eq!(cache.hits, 0);
        assert_eq!(cache.misses, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let mut cache = PriceCache::new();
        assert!(cache.price(&params(-1.0)).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.misses, 0);
    }
}
