pub mod blended_noise;
pub mod improved_noise;
pub mod normal_noise;
pub mod octave_perlin_noise;
pub mod simplex_noise;

use crate::error::WorldgenError;
use crate::resource_key;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoiseError {
    #[error("noise needs at least one amplitude")]
    EmptyAmplitudes,
    #[error("legacy octave noise cannot reach positive octave {0}")]
    PositiveLegacyOctaves(i32),
    #[error("created {created} noise levels for {expected} non-zero amplitudes")]
    LevelCountMismatch { created: usize, expected: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParam {
    #[serde(rename = "firstOctave")]
    pub first_octave: i32,
    pub amplitudes: Vec<f64>,
}

impl NoiseParam {
    pub fn new(first_octave: i32, amplitudes: Vec<f64>) -> Self {
        Self {
            first_octave,
            amplitudes,
        }
    }
}

impl From<Noises> for NoiseParam {
    #[inline]
    fn from(noise: Noises) -> Self {
        noise.to_noise_param()
    }
}

/// Noise parameters by key, in registration order.
#[derive(Clone, Debug, Default)]
pub struct NoiseRegistry {
    entries: IndexMap<String, NoiseParam>,
}

impl NoiseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every vanilla noise, so graphs can be evaluated without a datapack on disk.
    pub fn vanilla() -> Self {
        let entries = Noises::ALL
            .iter()
            .map(|noise| (noise.key().to_string(), noise.to_noise_param()))
            .collect();
        Self { entries }
    }

    pub fn register(&mut self, key: &str, param: NoiseParam) -> Result<(), WorldgenError> {
        let key = resource_key(key);
        if self.entries.contains_key(&key) {
            return Err(WorldgenError::DuplicateKey(key));
        }
        self.entries.insert(key, param);
        Ok(())
    }

    /// Adds or replaces an entry, returning the parameters it replaced.
    pub fn insert(&mut self, key: &str, param: NoiseParam) -> Option<NoiseParam> {
        self.entries.insert(resource_key(key), param)
    }

    pub fn get(&self, key: &str) -> Option<&NoiseParam> {
        self.entries.get(key).or_else(|| {
            if key.contains(':') {
                None
            } else {
                self.entries.get(&resource_key(key))
            }
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NoiseParam)> {
        self.entries.iter().map(|(key, param)| (key.as_str(), param))
    }
}

macro_rules! noises {
    ($($variant:ident => $key:literal, $first_octave:literal, [$($amplitude:expr),* $(,)?];)*) => {
        /// The vanilla noise parameter table.
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Copy, Serialize, Deserialize)]
        pub enum Noises {
            $(
                #[serde(rename = $key)]
                $variant,
            )*
        }

        impl Noises {
            pub const ALL: &'static [Noises] = &[$(Noises::$variant),*];

            pub fn key(self) -> &'static str {
                match self {
                    $(Noises::$variant => $key,)*
                }
            }

            pub fn from_key(key: &str) -> Option<Noises> {
                let key = resource_key(key);
                Noises::ALL.iter().copied().find(|noise| noise.key() == key)
            }

            pub fn to_noise_param(self) -> NoiseParam {
                match self {
                    $(Noises::$variant => NoiseParam::new($first_octave, vec![$($amplitude),*]),)*
                }
            }
        }
    };
}

noises! {
    Temperature => "minecraft:temperature", -10, [1.5, 0.0, 1.0, 0.0, 0.0, 0.0];
    Vegetation => "minecraft:vegetation", -8, [1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    Continentalness => "minecraft:continentalness", -9, [1.0, 1.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0];
    Erosion => "minecraft:erosion", -9, [1.0, 1.0, 0.0, 1.0, 1.0];
    TemperatureLarge => "minecraft:temperature_large", -12, [1.0, 0.0, 0.0, 0.0, 0.0, 0.0];
    VegetationLarge => "minecraft:vegetation_large", -10, [1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    ContinentalnessLarge => "minecraft:continentalness_large", -11, [1.0, 1.0, 2.0, 2.0, 2.0, 1.0, 1.0, 1.0, 1.0];
    ErosionLarge => "minecraft:erosion_large", -11, [1.0, 1.0, 0.0, 1.0, 1.0];
    Ridge => "minecraft:ridge", -7, [1.0, 2.0, 1.0, 0.0, 0.0, 0.0];
    Offset => "minecraft:offset", -3, [1.0, 1.0, 1.0, 0.0];
    AquiferBarrier => "minecraft:aquifer_barrier", -3, [1.0];
    AquiferFluidLevelFloodedness => "minecraft:aquifer_fluid_level_floodedness", -7, [1.0];
    AquiferLava => "minecraft:aquifer_lava", -1, [1.0];
    AquiferFluidLevelSpread => "minecraft:aquifer_fluid_level_spread", -5, [1.0];
    Pillar => "minecraft:pillar", -7, [1.0, 1.0];
    PillarRareness => "minecraft:pillar_rareness", -8, [1.0];
    PillarThickness => "minecraft:pillar_thickness", -8, [1.0];
    Spaghetti2D => "minecraft:spaghetti_2d", -7, [1.0];
    Spaghetti2DElevation => "minecraft:spaghetti_2d_elevation", -8, [1.0];
    Spaghetti2DModulator => "minecraft:spaghetti_2d_modulator", -11, [1.0];
    Spaghetti2DThickness => "minecraft:spaghetti_2d_thickness", -11, [1.0];
    Spaghetti3D1 => "minecraft:spaghetti_3d_1", -7, [1.0];
    Spaghetti3D2 => "minecraft:spaghetti_3d_2", -7, [1.0];
    Spaghetti3DRarity => "minecraft:spaghetti_3d_rarity", -11, [1.0];
    Spaghetti3DThickness => "minecraft:spaghetti_3d_thickness", -8, [1.0];
    SpaghettiRoughness => "minecraft:spaghetti_roughness", -5, [1.0];
    SpaghettiRoughnessModulator => "minecraft:spaghetti_roughness_modulator", -8, [1.0];
    CaveEntrance => "minecraft:cave_entrance", -7, [0.4, 0.5, 1.0];
    CaveLayer => "minecraft:cave_layer", -8, [1.0];
    CaveCheese => "minecraft:cave_cheese", -8, [0.5, 1.0, 2.0, 1.0, 2.0, 1.0, 0.0, 2.0, 0.0];
    OreVeininess => "minecraft:ore_veininess", -8, [1.0];
    OreVeinA => "minecraft:ore_vein_a", -7, [1.0];
    OreVeinB => "minecraft:ore_vein_b", -7, [1.0];
    OreGap => "minecraft:ore_gap", -5, [1.0];
    Noodle => "minecraft:noodle", -8, [1.0];
    NoodleThickness => "minecraft:noodle_thickness", -8, [1.0];
    NoodleRidgeA => "minecraft:noodle_ridge_a", -7, [1.0];
    NoodleRidgeB => "minecraft:noodle_ridge_b", -7, [1.0];
    Jagged => "minecraft:jagged", -16, [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
    Surface => "minecraft:surface", -6, [1.0, 1.0, 1.0];
    SurfaceSecondary => "minecraft:surface_secondary", -6, [1.0, 1.0, 0.0, 1.0];
    ClayBandsOffset => "minecraft:clay_bands_offset", -8, [1.0];
    BadlandsPillar => "minecraft:badlands_pillar", -2, [1.0, 1.0, 1.0, 1.0];
    BadlandsPillarRoof => "minecraft:badlands_pillar_roof", -8, [1.0];
    BadlandsSurface => "minecraft:badlands_surface", -6, [1.0, 1.0, 1.0];
    IcebergPillar => "minecraft:iceberg_pillar", -6, [1.0, 1.0, 1.0, 1.0];
    IcebergPillarRoof => "minecraft:iceberg_pillar_roof", -3, [1.0];
    IcebergSurface => "minecraft:iceberg_surface", -6, [1.0, 1.0, 1.0];
    SurfaceSwamp => "minecraft:surface_swamp", -2, [1.0];
    Calcite => "minecraft:calcite", -9, [1.0, 1.0, 1.0, 1.0];
    Gravel => "minecraft:gravel", -8, [1.0, 1.0, 1.0, 1.0];
    PowderSnow => "minecraft:powder_snow", -6, [1.0, 1.0, 1.0, 1.0];
    PackedIce => "minecraft:packed_ice", -7, [1.0, 1.0, 1.0, 1.0];
    Ice => "minecraft:ice", -4, [1.0, 1.0, 1.0, 1.0];
    SoulSandLayer => "minecraft:soul_sand_layer", -8, [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0 / 75.0];
    GravelLayer => "minecraft:gravel_layer", -8, [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0 / 75.0];
    Patch => "minecraft:patch", -5, [1.0, 0.0, 0.0, 0.0, 0.0, 1.0 / 75.0];
    Netherrack => "minecraft:netherrack", -3, [1.0, 0.0, 0.0, 0.35];
    NetherWart => "minecraft:nether_wart", -3, [1.0, 0.0, 0.0, 0.9];
    NetherStateSelector => "minecraft:nether_state_selector", -4, [1.0];
}

#[cfg(test)]
mod test {
    use crate::noise::{NoiseParam, NoiseRegistry, Noises};

    #[test]
    fn vanilla_table() {
        assert_eq!(Noises::Offset.key(), "minecraft:offset");
        assert_eq!(Noises::from_key("continentalness"), Some(Noises::Continentalness));
        assert_eq!(Noises::from_key("minecraft:missing"), None);
        assert_eq!(
            NoiseParam::from(Noises::Ridge),
            NoiseParam::new(-7, vec![1.0, 2.0, 1.0, 0.0, 0.0, 0.0])
        );
        let registry = NoiseRegistry::vanilla();
        assert_eq!(registry.len(), Noises::ALL.len());
        assert!(registry.contains("surface"));
    }

    #[test]
    fn parameters_use_vanilla_json_names() {
        let param: NoiseParam =
            serde_json::from_str(r#"{"firstOctave": -3, "amplitudes": [1.0, 0.5]}"#).unwrap();
        assert_eq!(param, NoiseParam::new(-3, vec![1.0, 0.5]));
        let noise: Noises = serde_json::from_str(r#""minecraft:jagged""#).unwrap();
        assert_eq!(noise, Noises::Jagged);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = NoiseRegistry::new();
        registry.register("custom:a", NoiseParam::new(0, vec![1.0])).unwrap();
        assert!(registry.register("custom:a", NoiseParam::new(0, vec![1.0])).is_err());
        registry.register("b", NoiseParam::new(0, vec![1.0])).unwrap();
        assert!(registry.contains("minecraft:b"));
    }
}
