use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use turn_rs::TransactionId;

/// Source of unpredictable bytes used for transaction ids. A client owns its
/// own source, nothing is shared between client instances.
pub trait RandomSource {
    /// Fills `buffer` with random bytes.
    fn fill(&mut self, buffer: &mut [u8]);

    /// Generates a fresh transaction id.
    fn transaction_id(&mut self) -> TransactionId {
        let mut id = [0u8; 12];
        self.fill(&mut id);
        TransactionId::from(id)
    }
}

/// [`RandomSource`] backed by the standard cryptographically secure generator.
#[derive(Debug, Clone)]
pub struct StdRandom(StdRng);

impl StdRandom {
    /// Creates a generator seeded from the operating system entropy.
    pub fn from_os_rng() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Creates a deterministic generator. Only meant for tests and
    /// reproducible simulations.
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

impl RandomSource for StdRandom {
    fn fill(&mut self, buffer: &mut [u8]) {
        self.0.fill_bytes(buffer);
    }
}

impl<T: RandomSource + ?Sized> RandomSource for Box<T> {
    fn fill(&mut self, buffer: &mut [u8]) {
        (**self).fill(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sources_are_reproducible() {
        let mut a = StdRandom::from_seed(7);
        let mut b = StdRandom::from_seed(7);
        assert_eq!(a.transaction_id(), b.transaction_id());

        let mut c = StdRandom::from_seed(8);
        assert_ne!(a.transaction_id(), c.transaction_id());
    }

    #[test]
    fn consecutive_ids_differ() {
        let mut rng = StdRandom::from_os_rng();
        let first = rng.transaction_id();
        let second = rng.transaction_id();
        assert_ne!(first, second);
    }
}
