use crate::noise::NoiseError;
use crate::noise::improved_noise::ImprovedNoise;
use strata_random::Random;

const ROUND_OFF: f64 = 3.3554432E7;
/// Draws made by one `ImprovedNoise` construction, skipped for absent legacy octaves.
const SKIPPED_DRAWS: usize = 262;

#[derive(Clone, Debug, PartialEq)]
pub struct OctavePerlinNoise {
    first_octave: i32,
    amplitudes: Vec<f64>,
    noise_levels: Vec<Option<ImprovedNoise>>,
    lowest_freq_input_factor: f64,
    lowest_freq_value_factor: f64,
    max_value: f64,
}

impl OctavePerlinNoise {
    /// Every octave seeds from its own `octave_{n}` stream, so octaves are independent of
    /// each other and of the amplitude list.
    pub fn new<R>(random: &mut R, first_octave: i32, amplitudes: Vec<f64>) -> Result<Self, NoiseError>
    where
        R: Random,
    {
        if amplitudes.is_empty() {
            return Err(NoiseError::EmptyAmplitudes);
        }
        let factory = random.fork_positional();
        let noise_levels = amplitudes
            .iter()
            .enumerate()
            .map(|(i, amplitude)| {
                (*amplitude != 0.0).then(|| {
                    let octave = first_octave + i as i32;
                    ImprovedNoise::from_random(&mut factory.from_hash_of(format!("octave_{octave}")))
                })
            })
            .collect();
        Ok(Self::from_levels(first_octave, amplitudes, noise_levels))
    }

    /// Octaves drawn sequentially from one stream, highest frequency first. Absent octaves
    /// still consume their draws so later octaves stay aligned.
    pub fn new_legacy<R>(
        random: &mut R,
        first_octave: i32,
        amplitudes: Vec<f64>,
    ) -> Result<Self, NoiseError>
    where
        R: Random,
    {
        if amplitudes.is_empty() {
            return Err(NoiseError::EmptyAmplitudes);
        }
        let len = amplitudes.len() as i32;
        let zero_octave = -first_octave;
        let mut noise_levels: Vec<Option<ImprovedNoise>> = vec![None; amplitudes.len()];

        let first = ImprovedNoise::from_random(random);
        if zero_octave >= 0 && zero_octave < len && amplitudes[zero_octave as usize] != 0.0 {
            noise_levels[zero_octave as usize] = Some(first);
        }
        for level in (0..zero_octave).rev() {
            if level < len && amplitudes[level as usize] != 0.0 {
                noise_levels[level as usize] = Some(ImprovedNoise::from_random(random));
            } else {
                random.consume_count(SKIPPED_DRAWS);
            }
        }

        let created = noise_levels.iter().filter(|level| level.is_some()).count();
        let expected = amplitudes.iter().filter(|a| **a != 0.0).count();
        if zero_octave < len - 1 {
            return Err(NoiseError::PositiveLegacyOctaves(first_octave + len - 1));
        }
        if created != expected {
            return Err(NoiseError::LevelCountMismatch { created, expected });
        }
        Ok(Self::from_levels(first_octave, amplitudes, noise_levels))
    }

    fn from_levels(
        first_octave: i32,
        amplitudes: Vec<f64>,
        noise_levels: Vec<Option<ImprovedNoise>>,
    ) -> Self {
        let len = amplitudes.len() as i32;
        let mut noise = Self {
            first_octave,
            lowest_freq_input_factor: 2.0f64.powi(first_octave),
            lowest_freq_value_factor: 2.0f64.powi(len - 1) / (2.0f64.powi(len) - 1.0),
            max_value: 0.0,
            amplitudes,
            noise_levels,
        };
        noise.max_value = noise.edge_value(2.0);
        noise
    }

    pub fn first_octave(&self) -> i32 {
        self.first_octave
    }

    pub fn amplitudes(&self) -> &[f64] {
        &self.amplitudes
    }

    /// Octave counted from the highest frequency down.
    pub fn get_octave(&self, octave: usize) -> Option<&ImprovedNoise> {
        let index = self.noise_levels.len().checked_sub(octave + 1)?;
        self.noise_levels.get(index)?.as_ref()
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn max_broken_value(&self, y_multiplier: f64) -> f64 {
        self.edge_value(y_multiplier + 2.0)
    }

    fn edge_value(&self, scale: f64) -> f64 {
        let mut value = 0.0;
        let mut factor = self.lowest_freq_value_factor;
        for (level, amplitude) in self.noise_levels.iter().zip(&self.amplitudes) {
            if level.is_some() {
                value += amplitude * scale * factor;
            }
            factor /= 2.0;
        }
        value
    }

    /// Keeps coordinates inside the range where the gradient lattice stays precise.
    #[inline]
    pub fn wrap(value: f64) -> f64 {
        value - (value / ROUND_OFF + 0.5).floor() * ROUND_OFF
    }

    pub fn get_value(&self, x: f64, y: f64, z: f64) -> f64 {
        let mut value = 0.0;
        let mut input_factor = self.lowest_freq_input_factor;
        let mut value_factor = self.lowest_freq_value_factor;
        for (level, amplitude) in self.noise_levels.iter().zip(&self.amplitudes) {
            if let Some(level) = level {
                let sample = level.noise(
                    Self::wrap(x * input_factor),
                    Self::wrap(y * input_factor),
                    Self::wrap(z * input_factor),
                );
                value += amplitude * sample * value_factor;
            }
            input_factor *= 2.0;
            value_factor /= 2.0;
        }
        value
    }
}
