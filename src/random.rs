use rand::{rngs::StdRng, Rng, SeedableRng};

/// Source of the non-cryptographic randomness used by the scoring formulas.
///
/// Scorers take this as a parameter so a caller can swap the entropy-backed
/// generator for a seeded or scripted one.
pub trait RandomSource {
    /// Uniform integer in `low..=high`.
    fn int_in(&mut self, low: u64, high: u64) -> u64;

    /// Uniform float in `low..high`.
    fn float_in(&mut self, low: f64, high: f64) -> f64;

    /// Uniform float in `0..1`, used for probability rolls.
    fn roll(&mut self) -> f64;

    /// Pick `amount` distinct positions out of `0..len`, in draw order.
    fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..len).collect();
        let amount = amount.min(len);
        for idx in 0..amount {
            let pick = self.int_in(idx as u64, (len - 1) as u64) as usize;
            pool.swap(idx, pick);
        }
        pool.truncate(amount);
        pool
    }
}

pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn int_in(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    fn float_in(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..high)
    }

    fn roll(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Deterministic source: every range draw lands at the same relative
/// `position` and every probability roll returns `roll`.
#[derive(Debug, Clone, Copy)]
pub struct ScriptedRandom {
    position: f64,
    roll: f64,
}

impl ScriptedRandom {
    pub fn new(position: f64, roll: f64) -> Self {
        Self {
            position: position.clamp(0.0, 1.0),
            roll,
        }
    }

    /// Lowest value of every range, no probability roll ever succeeds.
    pub fn floor() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Highest value of every range, every probability roll succeeds.
    pub fn ceiling() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl RandomSource for ScriptedRandom {
    fn int_in(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        low + ((high - low) as f64 * self.position).round() as u64
    }

    fn float_in(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.position
    }

    fn roll(&mut self) -> f64 {
        self.roll
    }
}
