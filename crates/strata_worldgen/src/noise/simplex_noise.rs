use crate::noise::improved_noise::GRADIENT;
use std::ops::RangeInclusive;
use strata_random::Random;
use strata_random::legacy::LegacyRandom;

const SQRT_3: f64 = 1.7320508075688772;
const F2: f64 = 0.5 * (SQRT_3 - 1.0);
const G2: f64 = (3.0 - SQRT_3) / 6.0;
const SKIPPED_DRAWS: usize = 262;

#[derive(Debug, Clone, PartialEq)]
pub struct SimplexNoise {
    permutation: [u8; 256],
    pub origin_x: f64,
    pub origin_y: f64,
    pub origin_z: f64,
}

impl SimplexNoise {
    pub fn from_random<R>(random: &mut R) -> Self
    where
        R: Random,
    {
        let origin_x = random.next_f64() * 256.0;
        let origin_y = random.next_f64() * 256.0;
        let origin_z = random.next_f64() * 256.0;
        let mut permutation = [0u8; 256];
        for (i, slot) in permutation.iter_mut().enumerate() {
            *slot = i as u8;
        }
        for i in 0..256u32 {
            let j = random.next_u32_bound(256 - i);
            permutation.swap(i as usize, (i + j) as usize);
        }
        Self {
            permutation,
            origin_x,
            origin_y,
            origin_z,
        }
    }

    #[inline]
    fn p(&self, index: i32) -> i32 {
        self.permutation[(index & 0xFF) as usize] as i32
    }

    fn corner_noise(&self, gradient: i32, x: f64, y: f64, z: f64, falloff: f64) -> f64 {
        let mut t = falloff - x * x - y * y - z * z;
        if t < 0.0 {
            return 0.0;
        }
        t *= t;
        let g = &GRADIENT[gradient as usize];
        t * t * (g[0] * x + g[1] * y + g[2] * z)
    }

    pub fn get_value_2d(&self, x: f64, y: f64) -> f64 {
        let skew = (x + y) * F2;
        let cell_x = (x + skew).floor() as i32;
        let cell_y = (y + skew).floor() as i32;
        let unskew = (cell_x.wrapping_add(cell_y)) as f64 * G2;
        let x0 = x - (cell_x as f64 - unskew);
        let y0 = y - (cell_y as f64 - unskew);
        let (step_x, step_y) = if x0 > y0 { (1, 0) } else { (0, 1) };
        let x1 = x0 - step_x as f64 + G2;
        let y1 = y0 - step_y as f64 + G2;
        let x2 = x0 - 1.0 + 2.0 * G2;
        let y2 = y0 - 1.0 + 2.0 * G2;
        let i = cell_x & 0xFF;
        let j = cell_y & 0xFF;
        let g0 = self.p(i + self.p(j)) % 12;
        let g1 = self.p(i + step_x + self.p(j + step_y)) % 12;
        let g2 = self.p(i + 1 + self.p(j + 1)) % 12;
        let n0 = self.corner_noise(g0, x0, y0, 0.0, 0.5);
        let n1 = self.corner_noise(g1, x1, y1, 0.0, 0.5);
        let n2 = self.corner_noise(g2, x2, y2, 0.0, 0.5);
        70.0 * (n0 + n1 + n2)
    }

    pub fn get_value_3d(&self, x: f64, y: f64, z: f64) -> f64 {
        const F3: f64 = 0.3333333333333333;
        const G3: f64 = 0.16666666666666666;
        let skew = (x + y + z) * F3;
        let cell_x = (x + skew).floor() as i32;
        let cell_y = (y + skew).floor() as i32;
        let cell_z = (z + skew).floor() as i32;
        let unskew = (cell_x.wrapping_add(cell_y).wrapping_add(cell_z)) as f64 * G3;
        let x0 = x - (cell_x as f64 - unskew);
        let y0 = y - (cell_y as f64 - unskew);
        let z0 = z - (cell_z as f64 - unskew);
        let ((i1, j1, k1), (i2, j2, k2)) = if x0 >= y0 {
            if y0 >= z0 {
                ((1, 0, 0), (1, 1, 0))
            } else if x0 >= z0 {
                ((1, 0, 0), (1, 0, 1))
            } else {
                ((0, 0, 1), (1, 0, 1))
            }
        } else if y0 < z0 {
            ((0, 0, 1), (0, 1, 1))
        } else if x0 < z0 {
            ((0, 1, 0), (0, 1, 1))
        } else {
            ((0, 1, 0), (1, 1, 0))
        };
        let x1 = x0 - i1 as f64 + G3;
        let y1 = y0 - j1 as f64 + G3;
        let z1 = z0 - k1 as f64 + G3;
        let x2 = x0 - i2 as f64 + F3;
        let y2 = y0 - j2 as f64 + F3;
        let z2 = z0 - k2 as f64 + F3;
        let x3 = x0 - 1.0 + 0.5;
        let y3 = y0 - 1.0 + 0.5;
        let z3 = z0 - 1.0 + 0.5;
        let i = cell_x & 0xFF;
        let j = cell_y & 0xFF;
        let k = cell_z & 0xFF;
        let g0 = self.p(i + self.p(j + self.p(k))) % 12;
        let g1 = self.p(i + i1 + self.p(j + j1 + self.p(k + k1))) % 12;
        let g2 = self.p(i + i2 + self.p(j + j2 + self.p(k + k2))) % 12;
        let g3 = self.p(i + 1 + self.p(j + 1 + self.p(k + 1))) % 12;
        let n0 = self.corner_noise(g0, x0, y0, z0, 0.6);
        let n1 = self.corner_noise(g1, x1, y1, z1, 0.6);
        let n2 = self.corner_noise(g2, x2, y2, z2, 0.6);
        let n3 = self.corner_noise(g3, x3, y3, z3, 0.6);
        32.0 * (n0 + n1 + n2 + n3)
    }
}

/// Octaves of 2D simplex noise, used for biome temperature variation.
#[derive(Debug, Clone, PartialEq)]
pub struct PerlinSimplexNoise {
    noise_levels: Vec<Option<SimplexNoise>>,
    highest_freq_input_factor: f64,
    lowest_freq_value_factor: f64,
}

impl PerlinSimplexNoise {
    /// Levels are stored highest frequency first. Octaves above zero are seeded from a
    /// derived legacy stream.
    pub fn new<R>(random: &mut R, octaves: RangeInclusive<i32>) -> Self
    where
        R: Random,
    {
        let low = -*octaves.start();
        let high = *octaves.end();
        let count = (low + high + 1).max(0);
        let mut noise_levels: Vec<Option<SimplexNoise>> = vec![None; count as usize];

        let zero = SimplexNoise::from_random(random);
        if high >= 0 && high < count && octaves.contains(&0) {
            noise_levels[high as usize] = Some(zero.clone());
        }
        for m in (high + 1)..count {
            if m >= 0 && octaves.contains(&(high - m)) {
                noise_levels[m as usize] = Some(SimplexNoise::from_random(random));
            } else {
                random.consume_count(SKIPPED_DRAWS);
            }
        }
        if high > 0 {
            let seed = (zero.get_value_3d(zero.origin_x, zero.origin_y, zero.origin_z)
                * 9.223372036854776E18) as i64;
            let mut derived = LegacyRandom::new(seed);
            for o in (0..high).rev() {
                if o < count && octaves.contains(&(high - o)) {
                    noise_levels[o as usize] = Some(SimplexNoise::from_random(&mut derived));
                } else {
                    derived.consume_count(SKIPPED_DRAWS);
                }
            }
        }

        Self {
            noise_levels,
            highest_freq_input_factor: 2.0f64.powi(high),
            lowest_freq_value_factor: 1.0 / (2.0f64.powi(count) - 1.0),
        }
    }

    pub fn get_value(&self, x: f64, z: f64, use_origin: bool) -> f64 {
        let mut value = 0.0;
        let mut value_factor = self.lowest_freq_value_factor;
        let mut input_factor = self.highest_freq_input_factor;
        for level in &self.noise_levels {
            if let Some(level) = level {
                let (offset_x, offset_z) = if use_origin {
                    (level.origin_x, level.origin_y)
                } else {
                    (0.0, 0.0)
                };
                value += level.get_value_2d(x * input_factor + offset_x, z * input_factor + offset_z)
                    * value_factor;
            }
            input_factor /= 2.0;
            value_factor *= 2.0;
        }
        value
    }
}

#[cfg(test)]
mod test {
    use crate::noise::simplex_noise::{PerlinSimplexNoise, SimplexNoise};
    use strata_random::legacy::LegacyRandom;

    #[test]
    fn simplex_values() {
        let noise = SimplexNoise::from_random(&mut LegacyRandom::new(42));
        assert_eq!(noise.origin_x, 186.25630208841423);
        assert_eq!(noise.permutation[0..8], [70, 234, 61, 86, 42, 181, 32, 253]);
        assert_eq!(noise.get_value_2d(0.5, 0.25), 0.7126642826885867);
        assert_eq!(noise.get_value_2d(-12.3, 44.1), -0.09661370499250738);
        assert_eq!(noise.get_value_2d(100.0, -7.0), -0.10106911857242981);
        assert_eq!(noise.get_value_3d(0.5, 0.25, 3.0), -0.18218815104166655);
        assert_eq!(noise.get_value_3d(-12.3, 44.1, -0.7), -0.09312716483950478);
    }

    #[test]
    fn octave_values() {
        let temperature = PerlinSimplexNoise::new(&mut LegacyRandom::new(1234), 0..=0);
        assert_eq!(temperature.get_value(12.5, -6.25, false), -0.5611187070764811);

        let frozen = PerlinSimplexNoise::new(&mut LegacyRandom::new(3456), -2..=0);
        assert_eq!(frozen.get_value(12.0 * 0.05, -40.0 * 0.05, false) * 7.0, -1.1836764121991188);

        let positive = PerlinSimplexNoise::new(&mut LegacyRandom::new(77), -1..=2);
        assert_eq!(positive.get_value(3.5, -1.25, false), 0.1093232037986121);
    }
}
