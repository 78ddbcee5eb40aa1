use crate::noise::simplex_noise::PerlinSimplexNoise;
use crate::resource_key;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use strata_random::legacy::LegacyRandom;

static TEMPERATURE_NOISE: LazyLock<PerlinSimplexNoise> =
    LazyLock::new(|| PerlinSimplexNoise::new(&mut LegacyRandom::new(1234), 0..=0));
static FROZEN_TEMPERATURE_NOISE: LazyLock<PerlinSimplexNoise> =
    LazyLock::new(|| PerlinSimplexNoise::new(&mut LegacyRandom::new(3456), -2..=0));
static BIOME_INFO_NOISE: LazyLock<PerlinSimplexNoise> =
    LazyLock::new(|| PerlinSimplexNoise::new(&mut LegacyRandom::new(2345), 0..=0));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureModifier {
    #[default]
    None,
    Frozen,
}

impl TemperatureModifier {
    pub fn modify_temperature(self, x: i32, z: i32, temperature: f32) -> f32 {
        match self {
            TemperatureModifier::None => temperature,
            TemperatureModifier::Frozen => {
                let frozen = FROZEN_TEMPERATURE_NOISE.get_value(x as f64 * 0.05, z as f64 * 0.05, false) * 7.0;
                let info = BIOME_INFO_NOISE.get_value(x as f64 * 0.2, z as f64 * 0.2, false);
                if frozen + info < 0.3
                    && BIOME_INFO_NOISE.get_value(x as f64 * 0.09, z as f64 * 0.09, false) < 0.8
                {
                    return 0.2;
                }
                temperature
            }
        }
    }
}

/// The climate facts the surface rules ask of a biome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Biome {
    pub key: String,
    pub temperature: f32,
    #[serde(default)]
    pub temperature_modifier: TemperatureModifier,
}

impl Biome {
    pub fn new(key: &str, temperature: f32) -> Self {
        Self {
            key: resource_key(key),
            temperature,
            temperature_modifier: TemperatureModifier::None,
        }
    }

    pub fn frozen(key: &str, temperature: f32) -> Self {
        Self {
            temperature_modifier: TemperatureModifier::Frozen,
            ..Self::new(key, temperature)
        }
    }

    /// A handful of overworld biomes the surface rules commonly name.
    pub fn vanilla(key: &str) -> Option<Biome> {
        let key = resource_key(key);
        let biome = match key.strip_prefix("minecraft:")? {
            "plains" | "beach" | "river" => Biome::new(&key, 0.8),
            "forest" => Biome::new(&key, 0.7),
            "desert" | "badlands" | "eroded_badlands" | "wooded_badlands" => Biome::new(&key, 2.0),
            "ocean" | "deep_ocean" | "warm_ocean" | "lukewarm_ocean" | "cold_ocean" => Biome::new(&key, 0.5),
            "snowy_plains" | "ice_spikes" | "frozen_river" => Biome::new(&key, 0.0),
            "frozen_peaks" | "jagged_peaks" => Biome::new(&key, -0.7),
            "stony_peaks" => Biome::new(&key, 1.0),
            "frozen_ocean" => Biome::frozen(&key, 0.0),
            "deep_frozen_ocean" => Biome::frozen(&key, 0.5),
            _ => return None,
        };
        Some(biome)
    }

    pub fn is(&self, key: &str) -> bool {
        match key.split_once(':') {
            Some(_) => self.key == key,
            None => self.key.strip_prefix("minecraft:") == Some(key),
        }
    }

    /// Temperature at a position; above `sea_level + 17` it cools with height.
    pub fn height_adjusted_temperature(&self, x: i32, y: i32, z: i32, sea_level: i32) -> f32 {
        let temperature = self.temperature_modifier.modify_temperature(x, z, self.temperature);
        let snow_level = sea_level + 17;
        if y > snow_level {
            let noise = (TEMPERATURE_NOISE.get_value(
                (x as f32 / 8.0) as f64,
                (z as f32 / 8.0) as f64,
                false,
            ) * 8.0) as f32;
            return temperature - (noise + y as f32 - snow_level as f32) * 0.05 / 40.0;
        }
        temperature
    }

    pub fn cold_enough_to_snow(&self, x: i32, y: i32, z: i32, sea_level: i32) -> bool {
        self.height_adjusted_temperature(x, y, z, sea_level) < 0.15
    }

    pub fn should_melt_frozen_ocean_iceberg_slightly(&self, x: i32, y: i32, z: i32, sea_level: i32) -> bool {
        self.height_adjusted_temperature(x, y, z, sea_level) > 0.1
    }
}

/// Supplies the biome at a block position. Biome placement happens outside this crate.
pub trait BiomeLookup: Sync {
    fn biome(&self, x: i32, y: i32, z: i32) -> &Biome;
}

/// A world with one biome everywhere.
impl BiomeLookup for Biome {
    fn biome(&self, _x: i32, _y: i32, _z: i32) -> &Biome {
        self
    }
}
