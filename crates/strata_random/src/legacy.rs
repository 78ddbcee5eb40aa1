use crate::{PositionalRandomFactory, Random, block_pos_seed, java_string_hash, polar_gaussian};
use bevy_math::IVec3;
use rand_xoshiro::rand_core::RngCore;

const MODULUS_BITS: u32 = 48;
const MODULUS_MASK: i64 = 281474976710655;
const MULTIPLIER: i64 = 25214903917;
const INCREMENT: i64 = 11;
const F32_MULTIPLIER: f32 = 1.0 / (1u64 << 24) as f32;
const F64_MULTIPLIER: f64 = 1.0 / (1u64 << 53) as f64;

/// The 48-bit linear congruential generator of `java.util.Random`.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRandom {
    seed: i64,
    next_gaussian: Option<f64>,
}

impl LegacyRandom {
    pub fn new(seed: i64) -> Self {
        Self {
            seed: (seed ^ MULTIPLIER) & MODULUS_MASK,
            next_gaussian: None,
        }
    }

    #[inline]
    fn next_bits(&mut self, bits: u32) -> i32 {
        self.seed = self
            .seed
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT)
            & MODULUS_MASK;
        (self.seed >> (MODULUS_BITS - bits)) as i32
    }
}

impl RngCore for LegacyRandom {
    fn next_u32(&mut self) -> u32 {
        self.next_bits(32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_bits(32) as i64;
        let lo = self.next_bits(32) as i64;
        (hi << 32).wrapping_add(lo) as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

impl Random for LegacyRandom {
    fn is_legacy(&self) -> bool {
        true
    }

    fn set_seed(&mut self, seed: i64) {
        *self = LegacyRandom::new(seed);
    }

    fn next_bool(&mut self) -> bool {
        self.next_bits(1) != 0
    }

    fn next_u32_bound(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let bound = bound as i32;
        if bound & (bound - 1) == 0 {
            let n = self.next_bits(31) as i64;
            return ((bound as i64 * n) >> 31) as u32;
        }
        loop {
            let a = self.next_bits(31);
            let b = a % bound;
            if a.wrapping_sub(b).wrapping_add(bound - 1) >= 0 {
                return b as u32;
            }
        }
    }

    fn next_f32(&mut self) -> f32 {
        self.next_bits(24) as f32 * F32_MULTIPLIER
    }

    fn next_f64(&mut self) -> f64 {
        let hi = self.next_bits(26) as i64;
        let lo = self.next_bits(27) as i64;
        ((hi << 27) + lo) as f64 * F64_MULTIPLIER
    }

    fn next_gaussian(&mut self) -> f64 {
        if let Some(spare) = self.next_gaussian.take() {
            return spare;
        }
        let (value, spare) = polar_gaussian(self);
        self.next_gaussian = Some(spare);
        value
    }

    fn fork(&mut self) -> Self {
        LegacyRandom::new(self.next_i64())
    }

    fn fork_positional(&mut self) -> PositionalRandomFactory {
        PositionalRandomFactory::Legacy(LegacyPositionalRandomFactory::new(self.next_i64()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegacyPositionalRandomFactory {
    seed: i64,
}

impl LegacyPositionalRandomFactory {
    pub fn new(seed: i64) -> Self {
        Self { seed }
    }

    pub fn at<T>(&self, pos: T) -> LegacyRandom
    where
        T: Into<IVec3>,
    {
        LegacyRandom::new(block_pos_seed(pos) ^ self.seed)
    }

    pub fn from_hash_of(&self, name: impl AsRef<str>) -> LegacyRandom {
        LegacyRandom::new(java_string_hash(name.as_ref()) as i64 ^ self.seed)
    }

    pub fn from_seed(&self, seed: i64) -> LegacyRandom {
        LegacyRandom::new(seed)
    }
}

#[cfg(test)]
mod test {
    use crate::legacy::LegacyRandom;
    use crate::{PositionalRandomFactory, Random};
    use bevy_math::IVec3;

    #[test]
    fn next_i32() {
        let mut random = LegacyRandom::new(123);
        let expected = [
            -1188957731,
            1018954901,
            -39088943,
            1295249578,
            1087885590,
            -1829099982,
            -1680189627,
            1111887674,
            -833784125,
            -1621910390,
        ];
        for e in expected {
            assert_eq!(random.next_i32(), e);
        }
    }

    #[test]
    fn next_i32_bound() {
        let mut random = LegacyRandom::new(123);
        assert_eq!(random.next_i32_bound(256), Ok(185));
        assert_eq!(random.next_i32_bound(255), Ok(200));
        assert_eq!(random.next_i32_bound(254), Ok(74));
    }

    #[test]
    fn next_i64() {
        let mut random = LegacyRandom::new(123);
        let expected = [
            -5106534569952410475,
            -167885730524958550,
            4672433029010564658,
            -7216359497931550918,
        ];
        for e in expected {
            assert_eq!(random.next_i64(), e);
        }
    }

    #[test]
    fn next_f32() {
        let mut random = LegacyRandom::new(123);
        let expected = [
            0.72317415, 0.23724389, 0.99089885, 0.30157375, 0.2532931, 0.57412946, 0.60880035,
            0.2588815, 0.80586946, 0.6223695,
        ];
        for e in expected {
            assert_eq!(random.next_f32(), e);
        }
    }

    #[test]
    fn next_f64() {
        let mut random = LegacyRandom::new(123);
        let expected = [
            0.7231742029971469,
            0.9908988967772393,
            0.25329310557439133,
            0.6088003703785169,
            0.8058695140834087,
            0.8754127852514174,
            0.7160485112997248,
            0.07191702249367171,
            0.7962609718390335,
            0.5787169373422367,
        ];
        for e in expected {
            assert_eq!(random.next_f64(), e);
        }
    }

    #[test]
    fn positional() {
        let factory = LegacyRandom::new(99).fork_positional();
        let PositionalRandomFactory::Legacy(inner) = &factory else {
            panic!("expected legacy factory");
        };
        assert_eq!(inner.seed, -5119754439980850796);

        let mut random = factory.at(IVec3::new(3, 4, 5));
        assert_eq!(random.next_i32(), 1397864648);
        assert_eq!(random.next_i32(), -722432680);

        let mut random = factory.from_hash_of("minecraft:ore");
        assert_eq!(random.next_i32(), -190139283);
        assert_eq!(random.next_i32(), -703813657);
        assert!(random.is_legacy());
    }
}
