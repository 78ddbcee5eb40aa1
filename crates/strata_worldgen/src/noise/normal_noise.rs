use crate::noise::octave_perlin_noise::OctavePerlinNoise;
use crate::noise::{NoiseError, NoiseParam};
use strata_random::Random;

const INPUT_FACTOR: f64 = 1.0181268882175227;
const TARGET_DEVIATION: f64 = 1.0 / 6.0;

/// Two Perlin stacks sampled at slightly different frequencies, normalised so values have a
/// standard deviation close to 1/6 of the range.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalNoise {
    first: OctavePerlinNoise,
    second: OctavePerlinNoise,
    value_factor: f64,
    max_value: f64,
    parameters: NoiseParam,
}

impl NormalNoise {
    pub fn new<R>(random: &mut R, parameters: &NoiseParam) -> Result<Self, NoiseError>
    where
        R: Random,
    {
        let first = OctavePerlinNoise::new(
            random,
            parameters.first_octave,
            parameters.amplitudes.clone(),
        )?;
        let second = OctavePerlinNoise::new(
            random,
            parameters.first_octave,
            parameters.amplitudes.clone(),
        )?;
        Ok(Self::from_parts(first, second, parameters.clone()))
    }

    /// Sequentially seeded octaves, kept for the legacy climate noises.
    pub fn new_legacy<R>(random: &mut R, parameters: &NoiseParam) -> Result<Self, NoiseError>
    where
        R: Random,
    {
        let first = OctavePerlinNoise::new_legacy(
            random,
            parameters.first_octave,
            parameters.amplitudes.clone(),
        )?;
        let second = OctavePerlinNoise::new_legacy(
            random,
            parameters.first_octave,
            parameters.amplitudes.clone(),
        )?;
        Ok(Self::from_parts(first, second, parameters.clone()))
    }

    fn from_parts(first: OctavePerlinNoise, second: OctavePerlinNoise, parameters: NoiseParam) -> Self {
        let mut lowest = i32::MAX;
        let mut highest = i32::MIN;
        for (i, amplitude) in parameters.amplitudes.iter().enumerate() {
            if *amplitude != 0.0 {
                lowest = lowest.min(i as i32);
                highest = highest.max(i as i32);
            }
        }
        // with no active octave the span wraps to 1
        let span = highest.wrapping_sub(lowest);
        let value_factor = TARGET_DEVIATION / expected_deviation(span);
        let max_value = (first.max_value() + second.max_value()) * value_factor;
        Self {
            first,
            second,
            value_factor,
            max_value,
            parameters,
        }
    }

    #[inline]
    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn parameters(&self) -> &NoiseParam {
        &self.parameters
    }

    pub fn get_value(&self, x: f64, y: f64, z: f64) -> f64 {
        let x2 = x * INPUT_FACTOR;
        let y2 = y * INPUT_FACTOR;
        let z2 = z * INPUT_FACTOR;
        (self.first.get_value(x, y, z) + self.second.get_value(x2, y2, z2)) * self.value_factor
    }
}

fn expected_deviation(octave_span: i32) -> f64 {
    0.1 * (1.0 + 1.0 / (octave_span as f64 + 1.0))
}

#[cfg(test)]
mod test {
    use crate::noise::NoiseParam;
    use crate::noise::normal_noise::NormalNoise;
    use strata_random::legacy::LegacyRandom;
    use strata_random::xoroshiro::XoroshiroRandom;

    #[test]
    fn sample_legacy() {
        let mut random = LegacyRandom::new(82);
        let noise = NormalNoise::new_legacy(&mut random, &NoiseParam::new(-6, vec![1.0, 1.0])).unwrap();
        assert_eq!(noise.max_value(), 4.444444444444444);
        assert_eq!(noise.get_value(0.0, 0.0, 0.0), -0.11173738673691287);
        assert_eq!(noise.get_value(10.5, -3.0, 77.25), -0.10765623285706903);
        assert_eq!(noise.get_value(-512.0, 80.0, 4096.75), -0.07591616706385697);
    }

    #[test]
    fn all_zero_amplitudes_sample_zero() {
        let mut random = XoroshiroRandom::new(5);
        let noise = NormalNoise::new(&mut random, &NoiseParam::new(0, vec![0.0])).unwrap();
        assert_eq!(noise.max_value(), 0.0);
        assert_eq!(noise.get_value(12.0, 3.0, -4.0), 0.0);
    }

    #[test]
    fn values_stay_within_max() {
        let mut random = XoroshiroRandom::new(99);
        let noise =
            NormalNoise::new(&mut random, &NoiseParam::new(-4, vec![1.0, 1.0, 0.0, 2.0])).unwrap();
        for i in 0..500 {
            let v = noise.get_value(i as f64 * 3.7, i as f64 * -1.3, i as f64 * 11.1);
            assert!(v.abs() <= noise.max_value());
        }
    }
}
