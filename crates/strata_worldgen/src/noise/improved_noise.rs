use crate::math::{lerp3, smoothstep};
use strata_random::Random;

/// Gradient directions, the last four repeat earlier ones so a 4-bit hash can index directly.
pub(crate) const GRADIENT: [[f64; 3]; 16] = [
    [1.0, 1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, -1.0, 0.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
    [1.0, 0.0, -1.0],
    [-1.0, 0.0, -1.0],
    [0.0, 1.0, 1.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, -1.0],
    [0.0, -1.0, -1.0],
    [1.0, 1.0, 0.0],
    [0.0, -1.0, 1.0],
    [-1.0, 1.0, 0.0],
    [0.0, -1.0, -1.0],
];

/// `1.0E-7F` widened to double, as the vertical snapping term expects.
const Y_SNAP_EPSILON: f64 = 1.0000000116860974e-07;

#[inline]
pub(crate) fn grad_dot(hash: u8, x: f64, y: f64, z: f64) -> f64 {
    let g = &GRADIENT[(hash & 15) as usize];
    g[0] * x + g[1] * y + g[2] * z
}

/// Single octave of Perlin's improved gradient noise.
#[derive(Debug, Clone, PartialEq)]
pub struct ImprovedNoise {
    permutation: [u8; 256],
    pub origin_x: f64,
    pub origin_y: f64,
    pub origin_z: f64,
}

impl ImprovedNoise {
    /// Draws three origin doubles, then shuffles the permutation table.
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

    #[inline]
    pub fn noise(&self, x: f64, y: f64, z: f64) -> f64 {
        self.sample(x, y, z, 0.0, 0.0)
    }

    /// Samples with optional vertical snapping. When `y_scale` is non-zero the local y is
    /// quantised to multiples of `y_scale`, which produces the flattened layers used by the
    /// blended terrain noise.
    pub fn sample(&self, x: f64, y: f64, z: f64, y_scale: f64, y_max: f64) -> f64 {
        let shifted_x = x + self.origin_x;
        let shifted_y = y + self.origin_y;
        let shifted_z = z + self.origin_z;
        let section_x = shifted_x.floor() as i32;
        let section_y = shifted_y.floor() as i32;
        let section_z = shifted_z.floor() as i32;
        let local_x = shifted_x - section_x as f64;
        let local_y = shifted_y - section_y as f64;
        let local_z = shifted_z - section_z as f64;
        let snap = if y_scale != 0.0 {
            let t = if y_max >= 0.0 && y_max < local_y {
                y_max
            } else {
                local_y
            };
            ((t / y_scale + Y_SNAP_EPSILON).floor() as i32) as f64 * y_scale
        } else {
            0.0
        };
        self.sample_and_lerp(
            section_x,
            section_y,
            section_z,
            local_x,
            local_y - snap,
            local_z,
            local_y,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn sample_and_lerp(
        &self,
        section_x: i32,
        section_y: i32,
        section_z: i32,
        local_x: f64,
        local_y: f64,
        local_z: f64,
        fade_local_y: f64,
    ) -> f64 {
        let x0 = self.p(section_x);
        let x1 = self.p(section_x.wrapping_add(1));
        let x0y0 = self.p(x0.wrapping_add(section_y));
        let x0y1 = self.p(x0.wrapping_add(section_y).wrapping_add(1));
        let x1y0 = self.p(x1.wrapping_add(section_y));
        let x1y1 = self.p(x1.wrapping_add(section_y).wrapping_add(1));

        let hash = |base: i32, dz: i32| self.p(base.wrapping_add(section_z).wrapping_add(dz)) as u8;

        let d000 = grad_dot(hash(x0y0, 0), local_x, local_y, local_z);
        let d100 = grad_dot(hash(x1y0, 0), local_x - 1.0, local_y, local_z);
        let d010 = grad_dot(hash(x0y1, 0), local_x, local_y - 1.0, local_z);
        let d110 = grad_dot(hash(x1y1, 0), local_x - 1.0, local_y - 1.0, local_z);
        let d001 = grad_dot(hash(x0y0, 1), local_x, local_y, local_z - 1.0);
        let d101 = grad_dot(hash(x1y0, 1), local_x - 1.0, local_y, local_z - 1.0);
        let d011 = grad_dot(hash(x0y1, 1), local_x, local_y - 1.0, local_z - 1.0);
        let d111 = grad_dot(hash(x1y1, 1), local_x - 1.0, local_y - 1.0, local_z - 1.0);

        lerp3(
            smoothstep(local_x),
            smoothstep(fade_local_y),
            smoothstep(local_z),
            d000,
            d100,
            d010,
            d110,
            d001,
            d101,
            d011,
            d111,
        )
    }
}
