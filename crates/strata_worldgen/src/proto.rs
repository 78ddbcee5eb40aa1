use crate::climate::ParamPoint;
use crate::density_function::proto::DensityFunctionHolder;
use crate::resource_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct NoiseGeneratorSettings {
    pub noise: NoiseSettings,
    pub default_block: BlockState,
    pub default_fluid: BlockState,
    pub noise_router: ProtoNoiseRouter,
    pub surface_rule: SurfaceRule,
    #[serde(default)]
    pub spawn_target: Vec<ParamPoint>,
    pub sea_level: i32,
    #[serde(default)]
    pub disable_mob_generation: bool,
    #[serde(default)]
    pub aquifers_enabled: bool,
    #[serde(default)]
    pub ore_veins_enabled: bool,
    #[serde(default)]
    pub legacy_random_source: bool,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NoiseSettings {
    pub min_y: i32,
    pub height: i32,
    pub size_horizontal: i32,
    pub size_vertical: i32,
}

impl NoiseSettings {
    #[inline]
    pub fn cell_width(&self) -> i32 {
        self.size_horizontal * 4
    }

    #[inline]
    pub fn cell_height(&self) -> i32 {
        self.size_vertical * 4
    }

    /// Exclusive upper block bound.
    #[inline]
    pub fn max_y(&self) -> i32 {
        self.min_y + self.height
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ProtoNoiseRouter {
    pub barrier: DensityFunctionHolder,
    pub fluid_level_floodedness: DensityFunctionHolder,
    pub fluid_level_spread: DensityFunctionHolder,
    pub lava: DensityFunctionHolder,
    pub temperature: DensityFunctionHolder,
    pub vegetation: DensityFunctionHolder,
    pub continents: DensityFunctionHolder,
    pub erosion: DensityFunctionHolder,
    pub depth: DensityFunctionHolder,
    pub ridges: DensityFunctionHolder,
    pub preliminary_surface_level: DensityFunctionHolder,
    pub final_density: DensityFunctionHolder,
    pub vein_toggle: DensityFunctionHolder,
    pub vein_ridged: DensityFunctionHolder,
    pub vein_gap: DensityFunctionHolder,
}

impl ProtoNoiseRouter {
    pub fn holders(&self) -> [&DensityFunctionHolder; 15] {
        [
            &self.barrier,
            &self.fluid_level_floodedness,
            &self.fluid_level_spread,
            &self.lava,
            &self.temperature,
            &self.vegetation,
            &self.continents,
            &self.erosion,
            &self.depth,
            &self.ridges,
            &self.preliminary_surface_level,
            &self.final_density,
            &self.vein_toggle,
            &self.vein_ridged,
            &self.vein_gap,
        ]
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SurfaceRule {
    #[serde(rename = "minecraft:bandlands", alias = "bandlands")]
    Bandlands,
    #[serde(rename = "minecraft:block", alias = "block")]
    Block { result_state: BlockState },
    #[serde(rename = "minecraft:sequence", alias = "sequence")]
    Sequence { sequence: Vec<SurfaceRule> },
    #[serde(rename = "minecraft:condition", alias = "condition")]
    Condition {
        if_true: Box<ConditionSource>,
        then_run: Box<SurfaceRule>,
    },
}

fn unbounded() -> f64 {
    f64::MAX
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConditionSource {
    #[serde(rename = "minecraft:biome", alias = "biome")]
    Biome { biome_is: Vec<String> },
    #[serde(rename = "minecraft:noise_threshold", alias = "noise_threshold")]
    NoiseThreshold {
        noise: String,
        min_threshold: f64,
        #[serde(default = "unbounded")]
        max_threshold: f64,
    },
    #[serde(rename = "minecraft:vertical_gradient", alias = "vertical_gradient")]
    VerticalGradient {
        random_name: String,
        true_at_and_below: VerticalAnchor,
        false_at_and_above: VerticalAnchor,
    },
    #[serde(rename = "minecraft:y_above", alias = "y_above")]
    YAbove {
        anchor: VerticalAnchor,
        surface_depth_multiplier: i32,
        add_stone_depth: bool,
    },
    #[serde(rename = "minecraft:water", alias = "water")]
    Water {
        offset: i32,
        surface_depth_multiplier: i32,
        add_stone_depth: bool,
    },
    #[serde(rename = "minecraft:temperature", alias = "temperature")]
    Temperature,
    #[serde(rename = "minecraft:steep", alias = "steep")]
    Steep,
    #[serde(rename = "minecraft:not", alias = "not")]
    Not { invert: Box<ConditionSource> },
    #[serde(rename = "minecraft:hole", alias = "hole")]
    Hole,
    #[serde(rename = "minecraft:above_preliminary_surface", alias = "above_preliminary_surface")]
    AbovePreliminarySurface,
    #[serde(rename = "minecraft:stone_depth", alias = "stone_depth")]
    StoneDepth {
        offset: i32,
        add_surface_depth: bool,
        secondary_depth_range: i32,
        surface_type: CaveSurface,
    },
}

#[derive(Hash, PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerticalAnchor {
    Absolute { absolute: i32 },
    AboveBottom { above_bottom: i32 },
    BelowTop { below_top: i32 },
}

impl VerticalAnchor {
    pub fn resolve(&self, min_y: i32, height: i32) -> i32 {
        match self {
            VerticalAnchor::Absolute { absolute } => *absolute,
            VerticalAnchor::AboveBottom { above_bottom } => min_y + above_bottom,
            VerticalAnchor::BelowTop { below_top } => min_y + height - 1 - below_top,
        }
    }
}

#[derive(Hash, PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaveSurface {
    Ceiling,
    Floor,
}

#[derive(Hash, PartialEq, Eq, Debug, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockState {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Properties", default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
}

impl BlockState {
    pub fn new(name: &str) -> Self {
        Self {
            name: resource_key(name),
            properties: None,
        }
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn air() -> Self {
        Self::new("air")
    }

    pub fn water() -> Self {
        Self::new("water").with_property("level", "0")
    }

    pub fn lava() -> Self {
        Self::new("lava").with_property("level", "0")
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name || self.name.strip_prefix("minecraft:") == Some(name)
    }

    pub fn is_air(&self) -> bool {
        matches!(
            self.name.as_str(),
            "minecraft:air" | "minecraft:cave_air" | "minecraft:void_air"
        )
    }

    pub fn is_fluid(&self) -> bool {
        matches!(self.name.as_str(), "minecraft:water" | "minecraft:lava")
    }
}

impl Display for BlockState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        if let Some(properties) = &self.properties {
            let mut first = true;
            f.write_str("[")?;
            for (key, value) in properties {
                if !first {
                    f.write_str(",")?;
                }
                first = false;
                write!(f, "{key}={value}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

/// A closed range written as a single value, a `[min, max]` pair or a `{min, max}` object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "Either<I, Either<[I; 2], InternalInterval<I>>>")]
#[serde(into = "Either<I, Either<[I; 2], InternalInterval<I>>>")]
pub struct Interval<I>
where
    I: Clone + PartialEq,
{
    pub(crate) min: I,
    pub(crate) max: I,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
struct InternalInterval<I> {
    min: I,
    max: I,
}

impl<I: Clone + PartialEq> From<Either<I, Either<[I; 2], InternalInterval<I>>>> for Interval<I> {
    fn from(value: Either<I, Either<[I; 2], InternalInterval<I>>>) -> Self {
        match value {
            Either::Left(i) => Interval {
                min: i.clone(),
                max: i,
            },
            Either::Right(Either::Left([min, max])) => Interval { min, max },
            Either::Right(Either::Right(i)) => Interval {
                min: i.min,
                max: i.max,
            },
        }
    }
}

impl<I: Clone + PartialEq> From<Interval<I>> for Either<I, Either<[I; 2], InternalInterval<I>>> {
    fn from(value: Interval<I>) -> Self {
        if value.min == value.max {
            Either::Left(value.min)
        } else {
            Either::Right(Either::Left([value.min, value.max]))
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum Either<L, R> {
    Left(L),
    Right(R),
}

#[cfg(test)]
mod test {
    use crate::proto::{
        BlockState, CaveSurface, ConditionSource, NoiseGeneratorSettings, SurfaceRule, VerticalAnchor,
    };

    const DEMO_SETTINGS: &str =
        include_str!("../../../assets/demo/data/strata/worldgen/noise_settings/overworld.json");

    #[test]
    fn parse_settings() {
        let settings: NoiseGeneratorSettings = serde_json::from_str(DEMO_SETTINGS).unwrap();
        assert_eq!(settings.noise.min_y, -64);
        assert_eq!(settings.noise.cell_width(), 4);
        assert_eq!(settings.noise.cell_height(), 8);
        assert_eq!(settings.sea_level, 63);
        assert_eq!(settings.default_block, BlockState::new("stone"));
        assert!(settings.default_fluid.is_fluid());
        assert!(!settings.legacy_random_source);
        assert!(!settings.spawn_target.is_empty());
        assert!(matches!(settings.surface_rule, SurfaceRule::Sequence { .. }));

        let written = serde_json::to_string(&settings).unwrap();
        let reparsed: NoiseGeneratorSettings = serde_json::from_str(&written).unwrap();
        assert_eq!(settings, reparsed);
    }

    #[test]
    fn parse_conditions() {
        let condition: ConditionSource = serde_json::from_str(
            r#"{ "type": "minecraft:stone_depth", "offset": 0, "add_surface_depth": true,
                 "secondary_depth_range": 6, "surface_type": "floor" }"#,
        )
        .unwrap();
        assert_eq!(
            condition,
            ConditionSource::StoneDepth {
                offset: 0,
                add_surface_depth: true,
                secondary_depth_range: 6,
                surface_type: CaveSurface::Floor,
            }
        );
        let threshold: ConditionSource = serde_json::from_str(
            r#"{ "type": "minecraft:noise_threshold", "noise": "minecraft:surface", "min_threshold": -0.5 }"#,
        )
        .unwrap();
        assert!(matches!(
            threshold,
            ConditionSource::NoiseThreshold { max_threshold, .. } if max_threshold == f64::MAX
        ));
    }

    #[test]
    fn anchors_resolve() {
        let bottom: VerticalAnchor = serde_json::from_str(r#"{ "above_bottom": 5 }"#).unwrap();
        let top: VerticalAnchor = serde_json::from_str(r#"{ "below_top": 0 }"#).unwrap();
        let absolute: VerticalAnchor = serde_json::from_str(r#"{ "absolute": 97 }"#).unwrap();
        assert_eq!(bottom.resolve(-64, 384), -59);
        assert_eq!(top.resolve(-64, 384), 319);
        assert_eq!(absolute.resolve(-64, 384), 97);
    }

    #[test]
    fn block_states() {
        let water: BlockState =
            serde_json::from_str(r#"{ "Name": "minecraft:water", "Properties": { "level": "0" } }"#).unwrap();
        assert_eq!(water, BlockState::water());
        assert_eq!(water.to_string(), "minecraft:water[level=0]");
        assert!(water.is("water"));
        assert!(BlockState::new("cave_air").is_air());
        assert_eq!(
            serde_json::to_string(&BlockState::new("stone")).unwrap(),
            r#"{"Name":"minecraft:stone"}"#
        );
    }
}
