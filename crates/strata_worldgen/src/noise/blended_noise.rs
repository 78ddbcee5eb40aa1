use crate::math::clamped_lerp;
use crate::noise::NoiseError;
use crate::noise::octave_perlin_noise::OctavePerlinNoise;
use strata_random::Random;
use strata_random::xoroshiro::XoroshiroRandom;

const BASE_MULTIPLIER: f64 = 684.412;

/// The pre-1.18 terrain noise: a low-resolution selector blending between two limit noises.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendedNoise {
    min_limit_noise: OctavePerlinNoise,
    max_limit_noise: OctavePerlinNoise,
    main_noise: OctavePerlinNoise,
    xz_scale: f64,
    y_scale: f64,
    xz_factor: f64,
    y_factor: f64,
    smear_scale_multiplier: f64,
    xz_multiplier: f64,
    y_multiplier: f64,
    max_value: f64,
}

impl BlendedNoise {
    pub fn new<R>(
        random: &mut R,
        xz_scale: f64,
        y_scale: f64,
        xz_factor: f64,
        y_factor: f64,
        smear_scale_multiplier: f64,
    ) -> Result<Self, NoiseError>
    where
        R: Random,
    {
        let min_limit_noise = OctavePerlinNoise::new_legacy(random, -15, vec![1.0; 16])?;
        let max_limit_noise = OctavePerlinNoise::new_legacy(random, -15, vec![1.0; 16])?;
        let main_noise = OctavePerlinNoise::new_legacy(random, -7, vec![1.0; 8])?;
        let xz_multiplier = BASE_MULTIPLIER * xz_scale;
        let y_multiplier = BASE_MULTIPLIER * y_scale;
        let max_value = min_limit_noise.max_broken_value(y_multiplier);
        Ok(Self {
            min_limit_noise,
            max_limit_noise,
            main_noise,
            xz_scale,
            y_scale,
            xz_factor,
            y_factor,
            smear_scale_multiplier,
            xz_multiplier,
            y_multiplier,
            max_value,
        })
    }

    /// Placeholder instance used before a world seed is known.
    pub fn unseeded(
        xz_scale: f64,
        y_scale: f64,
        xz_factor: f64,
        y_factor: f64,
        smear_scale_multiplier: f64,
    ) -> Result<Self, NoiseError> {
        Self::new(
            &mut XoroshiroRandom::new(0),
            xz_scale,
            y_scale,
            xz_factor,
            y_factor,
            smear_scale_multiplier,
        )
    }

    /// Same shape, re-seeded from `random`.
    pub fn with_random<R>(&self, random: &mut R) -> Result<Self, NoiseError>
    where
        R: Random,
    {
        Self::new(
            random,
            self.xz_scale,
            self.y_scale,
            self.xz_factor,
            self.y_factor,
            self.smear_scale_multiplier,
        )
    }

    pub fn compute(&self, x: i32, y: i32, z: i32) -> f64 {
        let scaled_x = x as f64 * self.xz_multiplier;
        let scaled_y = y as f64 * self.y_multiplier;
        let scaled_z = z as f64 * self.xz_multiplier;
        let factored_x = scaled_x / self.xz_factor;
        let factored_y = scaled_y / self.y_factor;
        let factored_z = scaled_z / self.xz_factor;
        let smear = self.y_multiplier * self.smear_scale_multiplier;
        let factored_smear = smear / self.y_factor;

        let mut selector = 0.0;
        let mut factor = 1.0;
        for octave in 0..8 {
            if let Some(noise) = self.main_noise.get_octave(octave) {
                selector += noise.sample(
                    OctavePerlinNoise::wrap(factored_x * factor),
                    OctavePerlinNoise::wrap(factored_y * factor),
                    OctavePerlinNoise::wrap(factored_z * factor),
                    factored_smear * factor,
                    factored_y * factor,
                ) / factor;
            }
            factor /= 2.0;
        }

        let delta = (selector / 10.0 + 1.0) / 2.0;
        let only_max = delta >= 1.0;
        let only_min = delta <= 0.0;
        let mut min = 0.0;
        let mut max = 0.0;
        factor = 1.0;
        for octave in 0..16 {
            let xx = OctavePerlinNoise::wrap(scaled_x * factor);
            let yy = OctavePerlinNoise::wrap(scaled_y * factor);
            let zz = OctavePerlinNoise::wrap(scaled_z * factor);
            let y_scale = smear * factor;
            if !only_max && let Some(noise) = self.min_limit_noise.get_octave(octave) {
                min += noise.sample(xx, yy, zz, y_scale, scaled_y * factor) / factor;
            }
            if !only_min && let Some(noise) = self.max_limit_noise.get_octave(octave) {
                max += noise.sample(xx, yy, zz, y_scale, scaled_y * factor) / factor;
            }
            factor /= 2.0;
        }

        clamped_lerp(min / 512.0, max / 512.0, delta) / 128.0
    }

    #[inline]
    pub fn min_value(&self) -> f64 {
        -self.max_value
    }

    #[inline]
    pub fn max_value(&self) -> f64 {
        self.max_value
    }
}
