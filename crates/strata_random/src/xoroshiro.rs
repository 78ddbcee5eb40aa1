use bevy_math::IVec3;
use md5::{Digest, Md5};
use rand_xoshiro::Xoroshiro128PlusPlus;
use rand_xoshiro::rand_core::{RngCore, SeedableRng};

use crate::{PositionalRandomFactory, Random, block_pos_seed, polar_gaussian};

const F32_MULTIPLIER: f32 = 1.0 / (1u64 << 24) as f32;
const F64_MULTIPLIER: f64 = 1.0 / (1u64 << 53) as f64;
const STAFFORD_1: u64 = 0xbf58476d1ce4e5b9;
const STAFFORD_2: u64 = 0x94d049bb133111eb;
const SILVER_RATIO: u64 = 0x6a09e667f3bcc909;
const GOLDEN_RATIO: u64 = 0x9e3779b97f4a7c15;

#[derive(Debug, Clone, PartialEq)]
pub struct XoroshiroRandom {
    inner: Xoroshiro128PlusPlus,
    next_gaussian: Option<f64>,
}

impl XoroshiroRandom {
    pub fn new(seed: i64) -> Self {
        let (lo, hi) = upgrade_seed_to_u128(seed as u64);
        Self::from_u128_seed(lo, hi)
    }

    /// Raw 128-bit state. An all-zero state is replaced by the golden/silver constants,
    /// since xoroshiro never leaves it.
    pub fn from_u128_seed(lo: u64, hi: u64) -> Self {
        let (lo, hi) = if lo == 0 && hi == 0 {
            (GOLDEN_RATIO, SILVER_RATIO)
        } else {
            (lo, hi)
        };
        let mut array = [0u8; 16];
        array[..8].copy_from_slice(&lo.to_le_bytes());
        array[8..16].copy_from_slice(&hi.to_le_bytes());
        Self {
            inner: Xoroshiro128PlusPlus::from_seed(array),
            next_gaussian: None,
        }
    }

    fn next_bits(&mut self, bits: usize) -> u64 {
        self.next_u64() >> (64 - bits)
    }
}

impl Random for XoroshiroRandom {
    fn is_legacy(&self) -> bool {
        false
    }

    fn set_seed(&mut self, seed: i64) {
        *self = XoroshiroRandom::new(seed);
    }

    fn next_bool(&mut self) -> bool {
        self.next_u64() & 1 != 0
    }

    fn next_u32_bound(&mut self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let mut l = self.next_u32() as u64;
        let mut m = l.wrapping_mul(bound as u64);
        let mut n = (m & 0xFFFFFFFF) as u32;
        if n < bound {
            let threshold = bound.wrapping_neg() % bound;
            while n < threshold {
                l = self.next_u32() as u64;
                m = l.wrapping_mul(bound as u64);
                n = (m & 0xFFFFFFFF) as u32;
            }
        }
        (m >> 32) as u32
    }

    fn next_f32(&mut self) -> f32 {
        self.next_bits(24) as f32 * F32_MULTIPLIER
    }

    fn next_f64(&mut self) -> f64 {
        self.next_bits(53) as f64 * F64_MULTIPLIER
    }

    fn next_gaussian(&mut self) -> f64 {
        if let Some(spare) = self.next_gaussian.take() {
            return spare;
        }
        let (value, spare) = polar_gaussian(self);
        self.next_gaussian = Some(spare);
        value
    }

    fn consume_count(&mut self, count: usize) {
        for _ in 0..count {
            self.next_u64();
        }
    }

    fn fork(&mut self) -> XoroshiroRandom {
        XoroshiroRandom::from_u128_seed(self.next_u64(), self.next_u64())
    }

    fn fork_positional(&mut self) -> PositionalRandomFactory {
        PositionalRandomFactory::Xoroshiro(XoroshiroPositionalRandomFactory::new(
            self.next_u64(),
            self.next_u64(),
        ))
    }
}

impl RngCore for XoroshiroRandom {
    /// Low half of the next long.
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u64() as u32
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XoroshiroPositionalRandomFactory {
    lo: u64,
    hi: u64,
}

impl XoroshiroPositionalRandomFactory {
    pub fn new(lo: u64, hi: u64) -> Self {
        Self { lo, hi }
    }

    pub fn at<T>(&self, pos: T) -> XoroshiroRandom
    where
        T: Into<IVec3>,
    {
        XoroshiroRandom::from_u128_seed(block_pos_seed(pos) as u64 ^ self.lo, self.hi)
    }

    /// The MD5 digest is used as raw state, without seed mixing.
    pub fn from_hash_of(&self, name: impl AsRef<str>) -> XoroshiroRandom {
        let hash = Md5::digest(name.as_ref().as_bytes());
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&hash[0..8]);
        hi.copy_from_slice(&hash[8..16]);
        XoroshiroRandom::from_u128_seed(
            u64::from_be_bytes(lo) ^ self.lo,
            u64::from_be_bytes(hi) ^ self.hi,
        )
    }

    pub fn from_seed(&self, seed: i64) -> XoroshiroRandom {
        XoroshiroRandom::from_u128_seed(seed as u64 ^ self.lo, seed as u64 ^ self.hi)
    }
}

fn mix_stafford_13(mut v: u64) -> u64 {
    v = (v ^ v >> 30).wrapping_mul(STAFFORD_1);
    v = (v ^ v >> 27).wrapping_mul(STAFFORD_2);
    v ^ v >> 31
}

fn upgrade_seed_to_u128(seed: u64) -> (u64, u64) {
    let lo = seed ^ SILVER_RATIO;
    let hi = lo.wrapping_add(GOLDEN_RATIO);
    (mix_stafford_13(lo), mix_stafford_13(hi))
}

#[cfg(test)]
mod test {
    use crate::xoroshiro::XoroshiroRandom;
    use crate::{PositionalRandomFactory, Random};
    use bevy_math::IVec3;

    #[test]
    fn next_i64() {
        let mut random = XoroshiroRandom::new(1);
        let expected = [
            -1033667707219518978,
            6451672561743293322,
            -1821890263888393630,
            890086654470169703,
            8094835630745194324,
            2779418831538184155,
            -2153570570747265786,
            2631759950516672506,
            1341645417244425603,
            -2886123833362855573,
        ];
        for &e in &expected {
            assert_eq!(random.next_i64(), e);
        }
    }

    #[test]
    fn next_i32() {
        let mut random = XoroshiroRandom::new(1);
        let expected = [
            1734564350,
            836234122,
            825264738,
            -1425890201,
            767430484,
            -2015535141,
            -606094074,
            950360058,
            224558467,
            916343147,
        ];
        for &e in &expected {
            assert_eq!(random.next_i32(), e);
        }
    }

    #[test]
    fn next_u32_bound() {
        let mut random = XoroshiroRandom::new(1);
        assert_eq!(random.next_u32_bound(25), 10);
        assert_eq!(random.next_u32_bound(256), 49);
        assert_eq!(random.next_u32_bound(255), 48);
        assert_eq!(random.next_u32_bound(254), 169);
        assert_eq!(random.next_u32_bound(0x7FFFFFFF), 383715241);
        assert_eq!(random.next_u32_bound(0), 0);
    }

    #[test]
    fn next_f32() {
        let mut random = XoroshiroRandom::new(1);
        let expected = [
            0.9439647, 0.34974587, 0.9012351, 0.04825169, 0.4388219, 0.15067255, 0.88325465,
            0.14266795, 0.07273072, 0.8435429,
        ];
        for &e in &expected {
            assert_eq!(random.next_f32(), e);
        }
    }

    #[test]
    fn next_f64() {
        let mut random = XoroshiroRandom::new(1);
        let expected = [
            0.9439647613102243,
            0.34974587038035987,
            0.9012351308931007,
            0.048251694223845565,
            0.4388219188383503,
            0.15067259677004097,
            0.8832547054297483,
            0.1426679927905259,
            0.07273074380408129,
            0.84354291349029,
        ];
        for &e in &expected {
            assert_eq!(random.next_f64(), e);
        }
    }

    #[test]
    fn zero_state_is_replaced() {
        let mut random = XoroshiroRandom::from_u128_seed(0, 0);
        assert_eq!(random.next_i64(), 6807859099481836695);
        assert_eq!(random.next_i64(), 5275285228792843439);
    }

    #[test]
    fn fork() {
        let mut parent = XoroshiroRandom::new(42);
        let mut child = parent.fork();
        assert_eq!(child.next_i64(), 726233142542344846);
        assert_eq!(child.next_i64(), -4265430536517436604);
        assert_eq!(parent.next_i64(), -7542733514721318211);
    }

    #[test]
    fn positional() {
        let factory = XoroshiroRandom::new(12345).fork_positional();
        let PositionalRandomFactory::Xoroshiro(inner) = &factory else {
            panic!("expected xoroshiro factory");
        };
        assert_eq!(inner.lo, 0x8f5558a8036890fb);
        assert_eq!(inner.hi, 0x725fe51ad193097e);

        let mut random = factory.at(IVec3::new(0, 64, 0));
        for e in [782221501510110947, 5234660274478635560, 1173524301424416834] {
            assert_eq!(random.next_i64(), e);
        }

        let mut random = factory.at(IVec3::new(-17, 5, 1_000_000));
        assert_eq!(random.next_i64(), 4047813377681966524);
        assert_eq!(random.next_i64(), 4227703789079794015);

        let mut random = factory.from_hash_of("minecraft:aquifer");
        for e in [7280243795428841706, -8497267231399644069, -47029323530890242] {
            assert_eq!(random.next_i64(), e);
        }

        // repeated lookups are identical
        assert_eq!(
            factory.at(IVec3::new(3, 3, 3)).next_i64(),
            factory.at(IVec3::new(3, 3, 3)).next_i64()
        );
    }
}
