use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Source of the per-request draw, uniform in `[0, 100)`.
pub trait RandomSource: Send + Sync {
    fn draw(&self) -> f64;
}

/// Thread-local RNG; the production source.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn draw(&self) -> f64 {
        rand::rng().random_range(0.0..100.0)
    }
}

/// Always returns the same draw. Used to pin outcomes in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub f64);

impl RandomSource for FixedDraw {
    fn draw(&self) -> f64 {
        self.0
    }
}

/// Reproducible draws from a seed.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn draw(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_range(0.0..100.0)
    }
}

const KEY_MIN: u64 = 1_000_000_000;
const KEY_MAX: u64 = 9_999_999_999;

/// Generates 10-digit decimal request keys.
pub struct KeyGenerator {
    seeded: Option<Mutex<StdRng>>,
}

impl KeyGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            seeded: seed.map(|s| Mutex::new(StdRng::seed_from_u64(s))),
        }
    }

    pub fn next_key(&self) -> String {
        let value = match &self.seeded {
            Some(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.random_range(KEY_MIN..=KEY_MAX)
            }
            None => rand::rng().random_range(KEY_MIN..=KEY_MAX),
        };
        value.to_string()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_in_range() {
        let source = ThreadRandom;
        for _ in 0..10_000 {
            let draw = source.draw();
            assert!((0.0..100.0).contains(&draw), "draw out of range: {}", draw);
        }
    }

    #[test]
    fn test_seeded_random_is_reproducible() {
        let a = SeededRandom::new(42);
        let b = SeededRandom::new(42);
        for _ in 0..100 {
            assert_eq!(a.draw(), b.draw());
        }
    }

    #[test]
    fn test_keys_are_ten_digits() {
        let keys = KeyGenerator::default();
        for _ in 0..1000 {
            let key = keys.next_key();
            assert_eq!(key.len(), 10, "bad key: {}", key);
            assert!(key.chars().all(|c| c.is_ascii_digit()));
            assert!(!key.starts_with('0'));
        }
    }

    #[test]
    fn test_seeded_keys_are_deterministic() {
        let a = KeyGenerator::new(Some(123));
        let b = KeyGenerator::new(Some(123));
        let left: Vec<String> = (0..10).map(|_| a.next_key()).collect();
        let right: Vec<String> = (0..10).map(|_| b.next_key()).collect();
        assert_eq!(left, right);
    }
}
