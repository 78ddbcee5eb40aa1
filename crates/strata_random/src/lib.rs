pub mod legacy;
pub mod xoroshiro;

use crate::legacy::{LegacyPositionalRandomFactory, LegacyRandom};
use crate::xoroshiro::{XoroshiroPositionalRandomFactory, XoroshiroRandom};
use bevy_math::IVec3;
use rand_xoshiro::rand_core::RngCore;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RandomError {
    #[error("bound must be positive, got {0}")]
    InvalidBound(i32),
}

/// Java-compatible random stream. Every generator in the engine goes through this trait so
/// that the same seed produces bit-identical worlds on every platform.
pub trait Random: RngCore + Clone {
    fn is_legacy(&self) -> bool;

    /// Reseeds the stream and drops any buffered gaussian.
    fn set_seed(&mut self, seed: i64);

    fn next_bool(&mut self) -> bool;

    fn next_i32(&mut self) -> i32 {
        self.next_u32() as i32
    }

    /// Uniform value in `[0, bound)`. A zero bound yields zero; use
    /// [`Random::next_i32_bound`] when the bound comes from outside.
    fn next_u32_bound(&mut self, bound: u32) -> u32;

    fn next_i32_bound(&mut self, bound: i32) -> Result<i32, RandomError> {
        if bound <= 0 {
            return Err(RandomError::InvalidBound(bound));
        }
        Ok(self.next_u32_bound(bound as u32) as i32)
    }

    fn next_i32_between_inclusive(&mut self, min: i32, max: i32) -> i32 {
        self.next_u32_bound(max.wrapping_sub(min).wrapping_add(1) as u32) as i32 + min
    }

    fn next_i64(&mut self) -> i64 {
        self.next_u64() as i64
    }

    fn next_f32(&mut self) -> f32;

    fn next_f64(&mut self) -> f64;

    fn next_gaussian(&mut self) -> f64;

    fn consume_count(&mut self, count: usize) {
        for _ in 0..count {
            self.next_u32();
        }
    }

    fn fork(&mut self) -> Self;

    fn fork_positional(&mut self) -> PositionalRandomFactory;
}

/// Marsaglia polar method, returns the sample and its spare.
fn polar_gaussian<R: Random>(random: &mut R) -> (f64, f64) {
    loop {
        let a = 2.0 * random.next_f64() - 1.0;
        let b = 2.0 * random.next_f64() - 1.0;
        let s = a * a + b * b;
        if s < 1.0 && s != 0.0 {
            let m = (-2.0 * s.ln() / s).sqrt();
            return (a * m, b * m);
        }
    }
}

pub fn block_pos_seed<T>(pos: T) -> i64
where
    T: Into<IVec3>,
{
    let pos = pos.into();
    let mut l = (pos.x.wrapping_mul(3129871) as i64)
        ^ (pos.z as i64).wrapping_mul(116129781)
        ^ (pos.y as i64);
    l = l
        .wrapping_mul(l)
        .wrapping_mul(42317861)
        .wrapping_add(l.wrapping_mul(11));
    l >> 16
}

/// `String.hashCode` over UTF-16 code units.
pub fn java_string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// World seed from user input: numeric strings are taken literally, anything else hashes.
pub fn parse_seed(value: &str) -> i64 {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .unwrap_or_else(|_| java_string_hash(trimmed) as i64)
}

#[derive(Clone, Debug, PartialEq)]
pub enum RandomSource {
    Legacy(LegacyRandom),
    Xoroshiro(XoroshiroRandom),
}

impl RandomSource {
    pub fn new(seed: i64, legacy: bool) -> Self {
        if legacy {
            RandomSource::Legacy(LegacyRandom::new(seed))
        } else {
            RandomSource::Xoroshiro(XoroshiroRandom::new(seed))
        }
    }
}

impl From<LegacyRandom> for RandomSource {
    fn from(value: LegacyRandom) -> Self {
        RandomSource::Legacy(value)
    }
}

impl From<XoroshiroRandom> for RandomSource {
    fn from(value: XoroshiroRandom) -> Self {
        RandomSource::Xoroshiro(value)
    }
}

impl RngCore for RandomSource {
    fn next_u32(&mut self) -> u32 {
        match self {
            RandomSource::Legacy(random) => random.next_u32(),
            RandomSource::Xoroshiro(random) => random.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            RandomSource::Legacy(random) => random.next_u64(),
            RandomSource::Xoroshiro(random) => random.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            RandomSource::Legacy(random) => random.fill_bytes(dest),
            RandomSource::Xoroshiro(random) => random.fill_bytes(dest),
        }
    }
}

impl Random for RandomSource {
    fn is_legacy(&self) -> bool {
        matches!(self, RandomSource::Legacy(_))
    }

    fn set_seed(&mut self, seed: i64) {
        match self {
            RandomSource::Legacy(random) => random.set_seed(seed),
            RandomSource::Xoroshiro(random) => random.set_seed(seed),
        }
    }

    fn next_bool(&mut self) -> bool {
        match self {
            RandomSource::Legacy(random) => random.next_bool(),
            RandomSource::Xoroshiro(random) => random.next_bool(),
        }
    }

    fn next_u32_bound(&mut self, bound: u32) -> u32 {
        match self {
            RandomSource::Legacy(random) => random.next_u32_bound(bound),
            RandomSource::Xoroshiro(random) => random.next_u32_bound(bound),
        }
    }

    fn next_f32(&mut self) -> f32 {
        match self {
            RandomSource::Legacy(random) => random.next_f32(),
            RandomSource::Xoroshiro(random) => random.next_f32(),
        }
    }

    fn next_f64(&mut self) -> f64 {
        match self {
            RandomSource::Legacy(random) => random.next_f64(),
            RandomSource::Xoroshiro(random) => random.next_f64(),
        }
    }

    fn next_gaussian(&mut self) -> f64 {
        match self {
            RandomSource::Legacy(random) => random.next_gaussian(),
            RandomSource::Xoroshiro(random) => random.next_gaussian(),
        }
    }

    fn fork(&mut self) -> Self {
        match self {
            RandomSource::Legacy(random) => RandomSource::Legacy(random.fork()),
            RandomSource::Xoroshiro(random) => RandomSource::Xoroshiro(random.fork()),
        }
    }

    fn fork_positional(&mut self) -> PositionalRandomFactory {
        match self {
            RandomSource::Legacy(random) => random.fork_positional(),
            RandomSource::Xoroshiro(random) => random.fork_positional(),
        }
    }
}

/// Stateless source of per-coordinate and per-name random streams.
///
/// Lookups never advance any shared state, so a factory can be queried from many threads and
/// in any order with identical results.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PositionalRandomFactory {
    Legacy(LegacyPositionalRandomFactory),
    Xoroshiro(XoroshiroPositionalRandomFactory),
}

impl PositionalRandomFactory {
    pub fn at<T>(&self, pos: T) -> RandomSource
    where
        T: Into<IVec3>,
    {
        match self {
            PositionalRandomFactory::Legacy(factory) => factory.at(pos).into(),
            PositionalRandomFactory::Xoroshiro(factory) => factory.at(pos).into(),
        }
    }

    pub fn from_hash_of(&self, name: impl AsRef<str>) -> RandomSource {
        match self {
            PositionalRandomFactory::Legacy(factory) => factory.from_hash_of(name).into(),
            PositionalRandomFactory::Xoroshiro(factory) => factory.from_hash_of(name).into(),
        }
    }

    pub fn from_seed(&self, seed: i64) -> RandomSource {
        match self {
            PositionalRandomFactory::Legacy(factory) => factory.from_seed(seed).into(),
            PositionalRandomFactory::Xoroshiro(factory) => factory.from_seed(seed).into(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::legacy::LegacyRandom;
    use crate::xoroshiro::XoroshiroRandom;
    use crate::{
        Random, RandomError, RandomSource, block_pos_seed, java_string_hash, parse_seed,
    };
    use bevy_math::IVec3;
    use rayon::prelude::*;

    fn chi_square<R: Random>(mut random: R, bound: u32, samples: usize) -> f64 {
        let mut buckets = vec![0usize; bound as usize];
        for _ in 0..samples {
            let value = random.next_i32_bound(bound as i32).unwrap();
            assert!(value >= 0 && (value as u32) < bound);
            buckets[value as usize] += 1;
        }
        let expected = samples as f64 / bound as f64;
        buckets
            .iter()
            .map(|&count| {
                let d = count as f64 - expected;
                d * d / expected
            })
            .sum()
    }

    #[test]
    fn bound_one_is_always_zero() {
        let mut xoroshiro = XoroshiroRandom::new(3);
        let mut legacy = LegacyRandom::new(3);
        for _ in 0..1000 {
            assert_eq!(xoroshiro.next_i32_bound(1), Ok(0));
            assert_eq!(legacy.next_i32_bound(1), Ok(0));
        }
    }

    #[test]
    fn non_positive_bound_is_rejected() {
        let mut random = RandomSource::new(1, false);
        assert_eq!(random.next_i32_bound(0), Err(RandomError::InvalidBound(0)));
        assert_eq!(random.next_i32_bound(-5), Err(RandomError::InvalidBound(-5)));
        let mut random = RandomSource::new(1, true);
        assert_eq!(random.next_i32_bound(0), Err(RandomError::InvalidBound(0)));
    }

    #[test]
    fn bounded_values_are_uniform() {
        // 99.9% critical values for 9, 6 and 15 degrees of freedom
        for (bound, critical) in [(10, 27.88), (7, 22.46), (16, 37.70)] {
            assert!(chi_square(XoroshiroRandom::new(7), bound, 100_000) < critical);
            assert!(chi_square(LegacyRandom::new(7), bound, 100_000) < critical);
        }
    }

    #[test]
    fn gaussian_moments() {
        for mut random in [RandomSource::new(99, false), RandomSource::new(99, true)] {
            let n = 20_000;
            let samples: Vec<f64> = (0..n).map(|_| random.next_gaussian()).collect();
            let mean = samples.iter().sum::<f64>() / n as f64;
            let variance = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
            assert!(mean.abs() < 0.05, "mean {mean}");
            assert!((variance - 1.0).abs() < 0.05, "variance {variance}");
        }
    }

    #[test]
    fn set_seed_drops_buffered_gaussian() {
        let mut a = XoroshiroRandom::new(5);
        a.next_gaussian();
        a.set_seed(11);
        let mut b = XoroshiroRandom::new(11);
        assert_eq!(a.next_gaussian(), b.next_gaussian());

        let mut a = LegacyRandom::new(5);
        a.next_gaussian();
        a.set_seed(11);
        let mut b = LegacyRandom::new(11);
        assert_eq!(a.next_gaussian(), b.next_gaussian());
    }

    #[test]
    fn pos_seed() {
        assert_eq!(block_pos_seed(IVec3::new(1, 2, 3)), -33674130277896);
        assert_eq!(block_pos_seed(IVec3::new(-100, 64, 12345)), -134443635571458);
        assert_eq!(
            block_pos_seed(IVec3::new(30_000_000, -64, -30_000_000)),
            -36386240128100
        );
    }

    #[test]
    fn seeds_from_strings() {
        assert_eq!(java_string_hash(""), 0);
        assert_eq!(java_string_hash("hello"), 99162322);
        assert_eq!(parse_seed("strata"), -891993411);
        assert_eq!(parse_seed("12345"), 12345);
        assert_eq!(parse_seed(" -42 "), -42);
    }

    #[test]
    fn positional_lookups_are_order_independent() {
        let factory = XoroshiroRandom::new(12345).fork_positional();
        let positions: Vec<IVec3> = (-20..20)
            .flat_map(|x| (-4..4).map(move |z| IVec3::new(x * 37, x + z, z * 91)))
            .collect();
        let sequential: Vec<i64> = positions
            .iter()
            .map(|&pos| factory.at(pos).next_i64())
            .collect();
        let reversed: Vec<i64> = positions
            .iter()
            .rev()
            .map(|&pos| factory.at(pos).next_i64())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let parallel: Vec<i64> = positions
            .par_iter()
            .map(|&pos| factory.at(pos).next_i64())
            .collect();
        assert_eq!(sequential, reversed);
        assert_eq!(sequential, parallel);

        let threaded: Vec<Vec<i64>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        positions
                            .iter()
                            .map(|&pos| factory.at(pos).next_i64())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for values in threaded {
            assert_eq!(values, sequential);
        }
    }
}
