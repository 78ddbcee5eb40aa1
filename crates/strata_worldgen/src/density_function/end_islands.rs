use crate::noise::simplex_noise::SimplexNoise;
use strata_random::Random;
use strata_random::legacy::LegacyRandom;

const SKIPPED_DRAWS: usize = 17292;
const ISLAND_THRESHOLD: f64 = -0.9f32 as f64;

/// The floating island field of the end: a central island plus scattered islands wherever
/// the simplex noise dips below a threshold far enough from the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct EndIslands {
    island_noise: SimplexNoise,
}

impl EndIslands {
    pub const MIN_VALUE: f64 = -0.84375;
    pub const MAX_VALUE: f64 = 0.5625;

    pub fn new(seed: i64) -> Self {
        let mut random = LegacyRandom::new(seed);
        random.consume_count(SKIPPED_DRAWS);
        Self {
            island_noise: SimplexNoise::from_random(&mut random),
        }
    }

    pub fn compute(&self, x: i32, z: i32) -> f64 {
        (self.height_value(x / 8, z / 8) as f64 - 8.0) / 128.0
    }

    fn height_value(&self, x: i32, z: i32) -> f32 {
        let chunk_x = x / 2;
        let chunk_z = z / 2;
        let offset_x = x % 2;
        let offset_z = z % 2;
        let distance = (x.wrapping_mul(x).wrapping_add(z.wrapping_mul(z)) as f32).sqrt();
        let mut height = (100.0 - distance * 8.0).clamp(-100.0, 80.0);
        for dx in -12..=12 {
            for dz in -12..=12 {
                let island_x = (chunk_x + dx) as i64;
                let island_z = (chunk_z + dz) as i64;
                if island_x * island_x + island_z * island_z > 4096
                    && self
                        .island_noise
                        .get_value_2d(island_x as f64, island_z as f64)
                        < ISLAND_THRESHOLD
                {
                    let falloff = ((island_x as f32).abs() * 3439.0
                        + (island_z as f32).abs() * 147.0)
                        % 13.0
                        + 9.0;
                    let h = (offset_x - dx * 2) as f32;
                    let s = (offset_z - dz * 2) as f32;
                    let island = (100.0 - (h * h + s * s).sqrt() * falloff).clamp(-100.0, 80.0);
                    height = height.max(island);
                }
            }
        }
        height
    }
}
