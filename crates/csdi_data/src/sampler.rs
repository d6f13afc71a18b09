//! Orderings of window ordinals for one epoch.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use csdi_core::Seed;

/// Produces the order in which a loader visits window ordinals.
pub trait Sampler: Send + Sync {
    /// Ordinals `0..n` in the order they should be visited.
    fn sample(&mut self, n: usize) -> Vec<usize>;
}

/// Visits ordinals in index order. Used for the valid and test partitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSampler;

impl Sampler for SequentialSampler {
    fn sample(&mut self, n: usize) -> Vec<usize> {
        (0..n).collect()
    }
}

/// Visits ordinals in a seeded random permutation.
///
/// Each call to [`sample`](Sampler::sample) continues the same random
/// stream, so successive epochs differ while the whole sequence is
/// reproducible from the seed.
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: ChaCha8Rng,
}

impl RandomSampler {
    /// Create a random sampler with a seed.
    #[must_use]
    pub fn new(seed: Seed) -> Self {
        Self { rng: seed.to_rng() }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, n: usize) -> Vec<usize> {
        let mut ordinals: Vec<usize> = (0..n).collect();
        ordinals.shuffle(&mut self.rng);
        ordinals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_sampler() {
        assert_eq!(SequentialSampler.sample(5), vec![0, 1, 2, 3, 4]);
        assert!(SequentialSampler.sample(0).is_empty());
    }

    #[test]
    fn test_random_sampler_is_permutation() {
        let mut sampler = RandomSampler::new(Seed::new(3));
        let mut ordinals = sampler.sample(808);
        assert_ne!(ordinals, (0..808).collect::<Vec<_>>());
        ordinals.sort_unstable();
        assert_eq!(ordinals, (0..808).collect::<Vec<_>>());
    }

    #[test]
    fn test_random_sampler_reproducible() {
        let mut a = RandomSampler::new(Seed::new(42));
        let mut b = RandomSampler::new(Seed::new(42));
        assert_eq!(a.sample(50), b.sample(50));
        // second epoch continues the stream
        let first = RandomSampler::new(Seed::new(42)).sample(50);
        assert_ne!(a.sample(50), first);
    }
}
