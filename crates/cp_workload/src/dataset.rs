//! Deterministic values and keys for a run.
//!
//! Everything here is generated once during setup and then shared read-only
//! by every worker, so none of it needs synchronization.

use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;

use cp_store::MapKey;

use crate::config::KeyMode;
use crate::rng;

/// Fixed prefix of every generated string key.
pub const KEY_PREFIX: &str = "PREFIX_";

/// Pool of fixed-size values the workload writes.
#[derive(Clone, Debug)]
pub struct ValuePool {
    values: Arc<[Bytes]>,
}

impl ValuePool {
    /// Fill `count` values of `size_bytes` random bytes each. The same seed
    /// and dimensions always yield a byte-identical pool.
    pub fn generate(count: usize, size_bytes: usize, seed: u64) -> Self {
        let mut rng = rng::seeded(seed);
        let values = (0..count)
            .map(|_| {
                let mut buf = vec![0u8; size_bytes];
                rng.fill(buf.as_mut_slice());
                Bytes::from(buf)
            })
            .collect::<Vec<_>>();
        Self {
            values: values.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> &Bytes {
        &self.values[index]
    }

    /// Uniformly random value from the pool.
    pub fn pick(&self, rng: &mut impl Rng) -> Bytes {
        self.values[rng::random_index(rng, self.values.len())].clone()
    }
}

/// Value written to every key by the bulk loader.
pub fn initial_value(size_bytes: usize, seed: u64) -> Bytes {
    let mut buf = vec![0u8; size_bytes];
    rng::seeded(seed).fill(buf.as_mut_slice());
    Bytes::from(buf)
}

/// Build the fixed-width key `PREFIX_{index}{digits}` of exactly
/// `key_size_bytes / 2` characters.
pub fn generate_key(
    index: usize,
    key_size_bytes: usize,
    rng: &mut impl Rng,
) -> anyhow::Result<String> {
    let total = key_size_bytes / 2;
    let number = index.to_string();
    let Some(remaining) = total.checked_sub(KEY_PREFIX.len() + number.len()) else {
        anyhow::bail!(
            "key {index} does not fit in {total} characters (key_size_bytes={key_size_bytes})"
        );
    };

    let mut key = String::with_capacity(total);
    key.push_str(KEY_PREFIX);
    key.push_str(&number);
    for _ in 0..remaining {
        key.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    anyhow::ensure!(
        key.len() == total,
        "generated key {key:?} is {} characters, expected {total}",
        key.len()
    );
    Ok(key)
}

/// The key space `[0, len)` shared by every map.
///
/// Integer domains compute keys on the fly; prefixed domains hold one
/// precomputed string per index.
#[derive(Clone, Debug)]
pub struct KeyDomain {
    len: usize,
    pool: Option<Arc<[MapKey]>>,
}

impl KeyDomain {
    pub fn integers(keys: usize) -> Self {
        Self {
            len: keys,
            pool: None,
        }
    }

    /// Precompute `keys` string keys from a seed-derived digit stream.
    pub fn prefixed(keys: usize, key_size_bytes: usize, seed: u64) -> anyhow::Result<Self> {
        let mut rng = rng::seeded(rng::key_seed(seed));
        let pool = (0..keys)
            .map(|i| generate_key(i, key_size_bytes, &mut rng).map(|k| MapKey::from(k.as_str())))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            len: keys,
            pool: Some(pool.into()),
        })
    }

    pub fn build(
        mode: KeyMode,
        keys: usize,
        key_size_bytes: usize,
        seed: u64,
    ) -> anyhow::Result<Self> {
        match mode {
            KeyMode::Int => Ok(Self::integers(keys)),
            KeyMode::Prefixed => Self::prefixed(keys, key_size_bytes, seed),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Key for `index`, which must be below [`KeyDomain::len`].
    pub fn key(&self, index: usize) -> MapKey {
        match &self.pool {
            Some(pool) => pool[index].clone(),
            None => MapKey::Int(index as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_pool_is_deterministic_per_seed() {
        let a = ValuePool::generate(100, 16, 0);
        let b = ValuePool::generate(100, 16, 0);
        assert_eq!(a.len(), 100);
        for i in 0..a.len() {
            assert_eq!(a.get(i).len(), 16);
            assert_eq!(a.get(i), b.get(i));
        }

        let c = ValuePool::generate(100, 16, 1);
        assert!((0..100).any(|i| a.get(i) != c.get(i)));
    }

    #[test]
    fn generated_key_has_fixed_width() {
        let mut rng = rng::seeded(0);
        let key = generate_key(7, 20, &mut rng).expect("key fits");
        assert_eq!(key.len(), 10);
        assert!(key.starts_with("PREFIX_7"));
        assert!(key[8..].chars().all(|c| c.is_ascii_digit()));

        let exact = generate_key(123, 20, &mut rng).expect("key fits exactly");
        assert_eq!(exact, "PREFIX_123");
    }

    #[test]
    fn generated_key_that_cannot_fit_is_an_error() {
        let mut rng = rng::seeded(0);
        let err = generate_key(1234, 20, &mut rng).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn prefixed_domain_is_reproducible() {
        let a = KeyDomain::prefixed(50, 40, 9).unwrap();
        let b = KeyDomain::prefixed(50, 40, 9).unwrap();
        assert_eq!(a.len(), 50);
        for i in 0..50 {
            assert_eq!(a.key(i), b.key(i));
            assert!(a.key(i).to_string().starts_with(&format!("PREFIX_{i}")));
            assert_eq!(a.key(i).to_string().len(), 20);
        }
    }

    #[test]
    fn integer_domain_maps_index_to_key() {
        let domain = KeyDomain::build(KeyMode::Int, 3, 100, 0).unwrap();
        assert_eq!(domain.key(2), MapKey::Int(2));
        assert!(KeyDomain::build(KeyMode::Prefixed, 10, 4, 0).is_err());
    }
}
