use crate::chunk::{Heightmap, ProtoChunk};
use crate::error::WorldgenError;
use crate::math::{lerp2, map};
use crate::noise::normal_noise::NormalNoise;
use crate::noise_chunk::NoiseChunk;
use crate::proto::{BlockState, CaveSurface, ConditionSource, SurfaceRule};
use crate::random_state::RandomState;
use crate::router::NoiseRouter;
use crate::surface::SurfaceSystem;
use crate::surface::biome::{Biome, BiomeLookup};
use bevy_math::IVec3;
use std::sync::Arc;
use strata_random::{PositionalRandomFactory, Random};

/// A surface rule with its conditions resolved against one random state.
#[derive(Debug, Clone)]
pub(crate) enum Rule {
    Bandlands,
    Block(BlockState),
    Sequence(Vec<Rule>),
    Condition { condition: usize, then_run: Box<Rule> },
}

#[derive(Debug, Clone)]
pub(crate) enum Condition {
    Biome(Vec<String>),
    NoiseThreshold {
        noise: Arc<NormalNoise>,
        min_threshold: f64,
        max_threshold: f64,
    },
    VerticalGradient {
        random: PositionalRandomFactory,
        true_at_and_below: i32,
        false_at_and_above: i32,
    },
    YAbove {
        anchor: i32,
        surface_depth_multiplier: i32,
        add_stone_depth: bool,
    },
    Water {
        offset: i32,
        surface_depth_multiplier: i32,
        add_stone_depth: bool,
    },
    Temperature,
    Steep,
    Not(usize),
    Hole,
    AbovePreliminarySurface,
    StoneDepth {
        offset: i32,
        add_surface_depth: bool,
        secondary_depth_range: i32,
        surface_type: CaveSurface,
    },
}

/// How long a condition's answer stays valid.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    Column,
    Block,
    Uncached,
}

impl Condition {
    fn scope(&self) -> Scope {
        match self {
            Condition::NoiseThreshold { .. } | Condition::Steep | Condition::Hole => Scope::Column,
            Condition::Biome(_)
            | Condition::VerticalGradient { .. }
            | Condition::YAbove { .. }
            | Condition::Water { .. }
            | Condition::Temperature
            | Condition::StoneDepth { .. } => Scope::Block,
            Condition::Not(_) | Condition::AbovePreliminarySurface => Scope::Uncached,
        }
    }
}

/// The compiled rule tree. Conditions live in one table so their answers can be memoised by
/// index while a column is walked.
#[derive(Debug, Clone)]
pub struct SurfaceRules {
    pub(crate) root: Rule,
    pub(crate) conditions: Vec<Condition>,
}

impl SurfaceRules {
    /// Resolves noises, random factories and vertical anchors; unknown noise keys fail here.
    pub fn compile(
        rule: &SurfaceRule,
        state: &RandomState,
        min_y: i32,
        height: i32,
    ) -> Result<Self, WorldgenError> {
        let mut compiler = RuleCompiler {
            state,
            min_y,
            height,
            conditions: Vec::new(),
        };
        let root = compiler.rule(rule)?;
        Ok(Self {
            root,
            conditions: compiler.conditions,
        })
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// The replacement for the block the context points at, if any rule matches.
    pub fn apply<'a>(&'a self, ctx: &mut SurfaceContext<'a>, chunk: &ProtoChunk) -> Option<&'a BlockState> {
        self.root.try_apply(ctx, chunk)
    }
}

struct RuleCompiler<'a> {
    state: &'a RandomState,
    min_y: i32,
    height: i32,
    conditions: Vec<Condition>,
}

impl RuleCompiler<'_> {
    fn rule(&mut self, rule: &SurfaceRule) -> Result<Rule, WorldgenError> {
        Ok(match rule {
            SurfaceRule::Bandlands => Rule::Bandlands,
            SurfaceRule::Block { result_state } => Rule::Block(result_state.clone()),
            SurfaceRule::Sequence { sequence } => Rule::Sequence(
                sequence
                    .iter()
                    .map(|rule| self.rule(rule))
                    .collect::<Result<_, _>>()?,
            ),
            SurfaceRule::Condition { if_true, then_run } => Rule::Condition {
                condition: self.condition(if_true)?,
                then_run: Box::new(self.rule(then_run)?),
            },
        })
    }

    fn condition(&mut self, source: &ConditionSource) -> Result<usize, WorldgenError> {
        let condition = match source {
            ConditionSource::Biome { biome_is } => Condition::Biome(biome_is.clone()),
            ConditionSource::NoiseThreshold {
                noise,
                min_threshold,
                max_threshold,
            } => Condition::NoiseThreshold {
                noise: self.state.get_or_create_noise(noise)?,
                min_threshold: *min_threshold,
                max_threshold: *max_threshold,
            },
            ConditionSource::VerticalGradient {
                random_name,
                true_at_and_below,
                false_at_and_above,
            } => Condition::VerticalGradient {
                random: self.state.get_or_create_random_factory(random_name),
                true_at_and_below: true_at_and_below.resolve(self.min_y, self.height),
                false_at_and_above: false_at_and_above.resolve(self.min_y, self.height),
            },
            ConditionSource::YAbove {
                anchor,
                surface_depth_multiplier,
                add_stone_depth,
            } => Condition::YAbove {
                anchor: anchor.resolve(self.min_y, self.height),
                surface_depth_multiplier: *surface_depth_multiplier,
                add_stone_depth: *add_stone_depth,
            },
            ConditionSource::Water {
                offset,
                surface_depth_multiplier,
                add_stone_depth,
            } => Condition::Water {
                offset: *offset,
                surface_depth_multiplier: *surface_depth_multiplier,
                add_stone_depth: *add_stone_depth,
            },
            ConditionSource::Temperature => Condition::Temperature,
            ConditionSource::Steep => Condition::Steep,
            ConditionSource::Not { invert } => Condition::Not(self.condition(invert)?),
            ConditionSource::Hole => Condition::Hole,
            ConditionSource::AbovePreliminarySurface => Condition::AbovePreliminarySurface,
            ConditionSource::StoneDepth {
                offset,
                add_surface_depth,
                secondary_depth_range,
                surface_type,
            } => Condition::StoneDepth {
                offset: *offset,
                add_surface_depth: *add_surface_depth,
                secondary_depth_range: *secondary_depth_range,
                surface_type: *surface_type,
            },
        };
        self.conditions.push(condition);
        Ok(self.conditions.len() - 1)
    }
}

impl Rule {
    fn try_apply<'a>(&'a self, ctx: &mut SurfaceContext<'a>, chunk: &ProtoChunk) -> Option<&'a BlockState> {
        match self {
            Rule::Bandlands => Some(ctx.system.band(ctx.block_x, ctx.block_y, ctx.block_z)),
            Rule::Block(state) => Some(state),
            Rule::Sequence(rules) => rules.iter().find_map(|rule| rule.try_apply(ctx, chunk)),
            Rule::Condition { condition, then_run } => {
                if ctx.test(*condition, chunk) {
                    then_run.try_apply(ctx, chunk)
                } else {
                    None
                }
            }
        }
    }
}

/// Where the column walk currently stands. Column values are refreshed by
/// [`SurfaceContext::update_xz`], block values by [`SurfaceContext::update_y`].
pub struct SurfaceContext<'a> {
    system: &'a SurfaceSystem,
    biomes: &'a dyn BiomeLookup,
    router: &'a NoiseRouter,
    noise_chunk: &'a NoiseChunk,
    column_stamp: u64,
    block_stamp: u64,
    memo: Vec<Option<(u64, bool)>>,
    pub block_x: i32,
    pub block_y: i32,
    pub block_z: i32,
    pub surface_depth: i32,
    pub stone_depth_above: i32,
    pub stone_depth_below: i32,
    pub water_height: i32,
    surface_secondary: Option<f64>,
    min_surface_level: Option<i32>,
    biome: Option<&'a Biome>,
}

impl<'a> SurfaceContext<'a> {
    pub fn new(
        system: &'a SurfaceSystem,
        biomes: &'a dyn BiomeLookup,
        router: &'a NoiseRouter,
        noise_chunk: &'a NoiseChunk,
    ) -> Self {
        Self {
            system,
            biomes,
            router,
            noise_chunk,
            column_stamp: 0,
            block_stamp: 0,
            memo: vec![None; system.rules().condition_count()],
            block_x: 0,
            block_y: 0,
            block_z: 0,
            surface_depth: 0,
            stone_depth_above: 0,
            stone_depth_below: 0,
            water_height: i32::MIN,
            surface_secondary: None,
            min_surface_level: None,
            biome: None,
        }
    }

    pub fn update_xz(&mut self, x: i32, z: i32) {
        self.column_stamp += 1;
        self.block_stamp += 1;
        self.block_x = x;
        self.block_z = z;
        self.surface_depth = self.system.surface_depth(x, z);
        self.surface_secondary = None;
        self.min_surface_level = None;
    }

    pub fn update_y(&mut self, stone_depth_above: i32, stone_depth_below: i32, water_height: i32, y: i32) {
        self.block_stamp += 1;
        self.biome = None;
        self.block_y = y;
        self.water_height = water_height;
        self.stone_depth_below = stone_depth_below;
        self.stone_depth_above = stone_depth_above;
    }

    pub fn biome(&mut self) -> &'a Biome {
        match self.biome {
            Some(biome) => biome,
            None => {
                let biome = self.biomes.biome(self.block_x, self.block_y, self.block_z);
                self.biome = Some(biome);
                biome
            }
        }
    }

    pub fn surface_secondary(&mut self) -> f64 {
        if let Some(value) = self.surface_secondary {
            return value;
        }
        let value = self.system.surface_secondary(self.block_x, self.block_z);
        self.surface_secondary = Some(value);
        value
    }

    /// The lowest level the surface is expected at in this column, blended from the
    /// preliminary surface of the four surrounding 16 block cells.
    pub fn min_surface_level(&mut self) -> i32 {
        if let Some(level) = self.min_surface_level {
            return level;
        }
        let cell_x = self.block_x >> 4;
        let cell_z = self.block_z >> 4;
        let corner = |dx: i32, dz: i32| {
            self.noise_chunk
                .preliminary_surface_level(self.router, (cell_x + dx) << 4, (cell_z + dz) << 4) as f64
        };
        let level = lerp2(
            (self.block_x & 15) as f64 / 16.0,
            (self.block_z & 15) as f64 / 16.0,
            corner(0, 0),
            corner(1, 0),
            corner(0, 1),
            corner(1, 1),
        )
        .floor() as i32
            + self.surface_depth
            - 8;
        self.min_surface_level = Some(level);
        level
    }

    fn test(&mut self, index: usize, chunk: &ProtoChunk) -> bool {
        let system = self.system;
        let condition = &system.rules().conditions[index];
        let stamp = match condition.scope() {
            Scope::Column => Some(self.column_stamp),
            Scope::Block => Some(self.block_stamp),
            Scope::Uncached => None,
        };
        if let Some(stamp) = stamp
            && let Some((cached, value)) = self.memo[index]
            && cached == stamp
        {
            return value;
        }
        let value = self.evaluate(condition, chunk);
        if let Some(stamp) = stamp {
            self.memo[index] = Some((stamp, value));
        }
        value
    }

    fn evaluate(&mut self, condition: &Condition, chunk: &ProtoChunk) -> bool {
        match condition {
            Condition::Biome(keys) => {
                let biome = self.biome();
                keys.iter().any(|key| biome.is(key))
            }
            Condition::NoiseThreshold {
                noise,
                min_threshold,
                max_threshold,
            } => {
                let value = noise.get_value(self.block_x as f64, 0.0, self.block_z as f64);
                value >= *min_threshold && value <= *max_threshold
            }
            Condition::VerticalGradient {
                random,
                true_at_and_below,
                false_at_and_above,
            } => {
                let y = self.block_y;
                if y <= *true_at_and_below {
                    return true;
                }
                if y >= *false_at_and_above {
                    return false;
                }
                let probability = map(
                    y as f64,
                    *true_at_and_below as f64,
                    *false_at_and_above as f64,
                    1.0,
                    0.0,
                );
                let mut random = random.at(IVec3::new(self.block_x, y, self.block_z));
                (random.next_f32() as f64) < probability
            }
            Condition::YAbove {
                anchor,
                surface_depth_multiplier,
                add_stone_depth,
            } => {
                let stone = if *add_stone_depth { self.stone_depth_above } else { 0 };
                self.block_y + stone >= anchor + self.surface_depth * surface_depth_multiplier
            }
            Condition::Water {
                offset,
                surface_depth_multiplier,
                add_stone_depth,
            } => {
                if self.water_height == i32::MIN {
                    return true;
                }
                let stone = if *add_stone_depth { self.stone_depth_above } else { 0 };
                self.block_y + stone >= self.water_height + offset + self.surface_depth * surface_depth_multiplier
            }
            Condition::Temperature => {
                let sea_level = self.system.sea_level();
                self.biome()
                    .cold_enough_to_snow(self.block_x, self.block_y, self.block_z, sea_level)
            }
            Condition::Steep => {
                let x = self.block_x & 15;
                let z = self.block_z & 15;
                let height = |x: i32, z: i32| chunk.height_at(Heightmap::WorldSurfaceWg, x, z);
                let north = height(x, (z - 1).max(0));
                let south = height(x, (z + 1).min(15));
                if south >= north + 4 {
                    return true;
                }
                let west = height((x - 1).max(0), z);
                let east = height((x + 1).min(15), z);
                west >= east + 4
            }
            Condition::Not(inner) => !self.test(*inner, chunk),
            Condition::Hole => self.surface_depth <= 0,
            Condition::AbovePreliminarySurface => self.block_y >= self.min_surface_level(),
            Condition::StoneDepth {
                offset,
                add_surface_depth,
                secondary_depth_range,
                surface_type,
            } => {
                let stone_depth = match surface_type {
                    CaveSurface::Ceiling => self.stone_depth_below,
                    CaveSurface::Floor => self.stone_depth_above,
                };
                let surface_depth = if *add_surface_depth { self.surface_depth } else { 0 };
                let secondary_depth = if *secondary_depth_range == 0 {
                    0
                } else {
                    map(self.surface_secondary(), -1.0, 1.0, 0.0, *secondary_depth_range as f64) as i32
                };
                stone_depth <= 1 + offset + surface_depth + secondary_depth
            }
        }
    }
}
