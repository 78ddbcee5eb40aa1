pub mod biome;
pub mod rule;

use crate::chunk::{Heightmap, ProtoChunk};
use crate::error::WorldgenError;
use crate::math::round_half_up;
use crate::noise::Noises;
use crate::noise::normal_noise::NormalNoise;
use crate::noise_chunk::NoiseChunk;
use crate::proto::{BlockState, NoiseGeneratorSettings};
use crate::random_state::RandomState;
use crate::surface::biome::{Biome, BiomeLookup};
use crate::surface::rule::{SurfaceContext, SurfaceRules};
use bevy_math::IVec3;
use std::sync::Arc;
use strata_random::{PositionalRandomFactory, Random, RandomSource};
use tracing::{debug, debug_span};

const CLAY_BAND_COUNT: usize = 192;
const WAY_BELOW_MIN_Y: i32 = -2032 << 4;
/// Icebergs sample the biome temperature at this height whatever the sea level.
const ICEBERG_MELT_Y: i32 = 63;

/// Replaces the default block near the terrain surface according to the surface rules, and
/// adds eroded badlands pillars and frozen ocean icebergs.
pub struct SurfaceSystem {
    default_block: BlockState,
    sea_level: i32,
    random: PositionalRandomFactory,
    clay_bands: Vec<BlockState>,
    clay_bands_offset: Arc<NormalNoise>,
    surface: Arc<NormalNoise>,
    surface_secondary: Arc<NormalNoise>,
    badlands_pillar: Arc<NormalNoise>,
    badlands_pillar_roof: Arc<NormalNoise>,
    badlands_surface: Arc<NormalNoise>,
    iceberg_pillar: Arc<NormalNoise>,
    iceberg_pillar_roof: Arc<NormalNoise>,
    iceberg_surface: Arc<NormalNoise>,
    rules: SurfaceRules,
}

impl SurfaceSystem {
    /// Noises sampled outside the surface rules themselves.
    pub const NOISES: [Noises; 9] = [
        Noises::ClayBandsOffset,
        Noises::Surface,
        Noises::SurfaceSecondary,
        Noises::BadlandsPillar,
        Noises::BadlandsPillarRoof,
        Noises::BadlandsSurface,
        Noises::IcebergPillar,
        Noises::IcebergPillarRoof,
        Noises::IcebergSurface,
    ];

    pub fn new(state: &RandomState, settings: &NoiseGeneratorSettings) -> Result<Self, WorldgenError> {
        let noise = |noise: Noises| state.get_or_create_noise(noise.key());
        let random = state.random().clone();
        let clay_bands = generate_bands(&mut random.from_hash_of("minecraft:clay_bands"));
        let rules = SurfaceRules::compile(
            &settings.surface_rule,
            state,
            settings.noise.min_y,
            settings.noise.height,
        )?;
        debug!(conditions = rules.condition_count(), "compiled surface rules");
        Ok(Self {
            default_block: settings.default_block.clone(),
            sea_level: settings.sea_level,
            random,
            clay_bands,
            clay_bands_offset: noise(Noises::ClayBandsOffset)?,
            surface: noise(Noises::Surface)?,
            surface_secondary: noise(Noises::SurfaceSecondary)?,
            badlands_pillar: noise(Noises::BadlandsPillar)?,
            badlands_pillar_roof: noise(Noises::BadlandsPillarRoof)?,
            badlands_surface: noise(Noises::BadlandsSurface)?,
            iceberg_pillar: noise(Noises::IcebergPillar)?,
            iceberg_pillar_roof: noise(Noises::IcebergPillarRoof)?,
            iceberg_surface: noise(Noises::IcebergSurface)?,
            rules,
        })
    }

    pub fn rules(&self) -> &SurfaceRules {
        &self.rules
    }

    pub fn sea_level(&self) -> i32 {
        self.sea_level
    }

    pub fn clay_bands(&self) -> &[BlockState] {
        &self.clay_bands
    }

    pub fn surface_depth(&self, x: i32, z: i32) -> i32 {
        let noise = self.surface.get_value(x as f64, 0.0, z as f64);
        let jitter = self.random.at(IVec3::new(x, 0, z)).next_f64();
        (noise * 2.75 + 3.0 + jitter * 0.25) as i32
    }

    pub fn surface_secondary(&self, x: i32, z: i32) -> f64 {
        self.surface_secondary.get_value(x as f64, 0.0, z as f64)
    }

    /// The clay band at `y`, shifted per column.
    pub fn band(&self, x: i32, y: i32, z: i32) -> &BlockState {
        let offset = round_half_up(self.clay_bands_offset.get_value(x as f64, 0.0, z as f64) * 4.0) as i32;
        let index = (y + offset).rem_euclid(self.clay_bands.len() as i32);
        &self.clay_bands[index as usize]
    }

    /// Walks every column of `chunk` from the top down and applies the surface rules to each
    /// default block. Expects the chunk to be filled and its heightmaps current.
    pub fn build_surface(
        &self,
        state: &RandomState,
        biomes: &dyn BiomeLookup,
        noise_chunk: &NoiseChunk,
        chunk: &mut ProtoChunk,
    ) {
        let _span = debug_span!("surface", x = chunk.pos().x, z = chunk.pos().y).entered();
        let mut context = SurfaceContext::new(self, biomes, state.router(), noise_chunk);
        let min_y = chunk.min_y();
        for local_x in 0..16 {
            for local_z in 0..16 {
                let x = chunk.min_block_x() + local_x;
                let z = chunk.min_block_z() + local_z;
                let start_y = chunk.height_at(Heightmap::WorldSurfaceWg, x, z);
                let biome = biomes.biome(x, if state.is_legacy() { 0 } else { start_y }, z);
                if biome.is("minecraft:eroded_badlands") {
                    self.eroded_badlands_extension(chunk, x, z, start_y);
                }
                let end_y = chunk.height_at(Heightmap::WorldSurfaceWg, x, z);
                context.update_xz(x, z);

                let mut stone_depth_above = 0;
                let mut water_height = i32::MIN;
                let mut next_ceiling_stone_y = i32::MAX;
                for y in (min_y..=end_y).rev() {
                    let old = chunk.block_state(x, y, z);
                    if old.is_air() {
                        stone_depth_above = 0;
                        water_height = i32::MIN;
                        continue;
                    }
                    if old.is_fluid() {
                        if water_height == i32::MIN {
                            water_height = y + 1;
                        }
                        continue;
                    }
                    let replaceable = *old == self.default_block;
                    if next_ceiling_stone_y >= y {
                        next_ceiling_stone_y = WAY_BELOW_MIN_Y;
                        for below in (min_y - 1..y).rev() {
                            if !is_stone(chunk.block_state(x, below, z)) {
                                next_ceiling_stone_y = below + 1;
                                break;
                            }
                        }
                    }
                    stone_depth_above += 1;
                    let stone_depth_below = y - next_ceiling_stone_y + 1;
                    context.update_y(stone_depth_above, stone_depth_below, water_height, y);
                    if replaceable && let Some(state) = self.rules.apply(&mut context, chunk) {
                        chunk.set_block_state(x, y, z, state);
                    }
                }

                if biome.is("minecraft:frozen_ocean") || biome.is("minecraft:deep_frozen_ocean") {
                    let min_surface_level = context.min_surface_level();
                    self.frozen_ocean_extension(chunk, biome, x, z, start_y, min_surface_level);
                }
            }
        }
    }

    fn eroded_badlands_extension(&self, chunk: &mut ProtoChunk, x: i32, z: i32, height: i32) {
        let (fx, fz) = (x as f64, z as f64);
        let pillar_floor = (self.badlands_surface.get_value(fx, 0.0, fz) * 8.25)
            .abs()
            .min(self.badlands_pillar.get_value(fx * 0.2, 0.0, fz * 0.2) * 15.0);
        if pillar_floor <= 0.0 {
            return;
        }
        let roof = (self.badlands_pillar_roof.get_value(fx * 0.75, 0.0, fz * 0.75) * 1.5).abs();
        let pillar_height = 64.0 + (pillar_floor * pillar_floor * 2.5).min((roof * 50.0).ceil() + 24.0);
        let top = pillar_height.floor() as i32;
        if height > top {
            return;
        }
        for y in (chunk.min_y()..=top).rev() {
            let state = chunk.block_state(x, y, z);
            if state.name == self.default_block.name {
                break;
            }
            if state.is("minecraft:water") {
                return;
            }
        }
        let mut y = top;
        while y >= chunk.min_y() && chunk.block_state(x, y, z).is_air() {
            chunk.set_block_state(x, y, z, &self.default_block);
            y -= 1;
        }
    }

    fn melts_iceberg_slightly(&self, biome: &Biome, x: i32, z: i32) -> bool {
        biome.should_melt_frozen_ocean_iceberg_slightly(x, ICEBERG_MELT_Y, z, self.sea_level)
    }

    fn frozen_ocean_extension(
        &self,
        chunk: &mut ProtoChunk,
        biome: &Biome,
        x: i32,
        z: i32,
        height: i32,
        min_surface_level: i32,
    ) {
        let (fx, fz) = (x as f64, z as f64);
        let iceberg_floor = (self.iceberg_surface.get_value(fx, 0.0, fz) * 8.25)
            .abs()
            .min(self.iceberg_pillar.get_value(fx * 1.28, 0.0, fz * 1.28) * 15.0);
        if iceberg_floor <= 1.8 {
            return;
        }
        let roof = (self.iceberg_pillar_roof.get_value(fx * 1.17, 0.0, fz * 1.17) * 1.5).abs();
        let mut max_height = (iceberg_floor * iceberg_floor * 1.2).min((roof * 40.0).ceil() + 14.0);
        if self.melts_iceberg_slightly(biome, x, z) {
            max_height -= 2.0;
        }
        let min_height = if max_height > 2.0 {
            let min_height = self.sea_level as f64 - max_height - 7.0;
            max_height += self.sea_level as f64;
            min_height
        } else {
            max_height = 0.0;
            0.0
        };

        let mut random = self.random.at(IVec3::new(x, 0, z));
        let max_snow_depth = 2 + random.next_u32_bound(4) as i32;
        let min_snow_height = self.sea_level + 18 + random.next_u32_bound(10) as i32;
        let snow = BlockState::new("snow_block");
        let packed_ice = BlockState::new("packed_ice");
        let mut snow_depth = 0;
        for y in (min_surface_level..=height.max(max_height as i32 + 1)).rev() {
            let state = chunk.block_state(x, y, z);
            let freeze = state.is_air() && y < max_height as i32 && random.next_f64() > 0.01
                || state.is("minecraft:water")
                    && y > min_height as i32
                    && y < self.sea_level
                    && min_height != 0.0
                    && random.next_f64() > 0.15;
            if freeze {
                if snow_depth <= max_snow_depth && y > min_snow_height {
                    chunk.set_block_state(x, y, z, &snow);
                    snow_depth += 1;
                } else {
                    chunk.set_block_state(x, y, z, &packed_ice);
                }
            }
        }
    }
}

fn is_stone(state: &BlockState) -> bool {
    !state.is_air() && !state.is_fluid()
}

fn generate_bands(random: &mut RandomSource) -> Vec<BlockState> {
    let mut bands = vec![BlockState::new("terracotta"); CLAY_BAND_COUNT];
    let orange = BlockState::new("orange_terracotta");
    let mut i = 0;
    while i < bands.len() {
        i += random.next_u32_bound(5) as usize + 1;
        if i < bands.len() {
            bands[i] = orange.clone();
        }
        i += 1;
    }
    make_bands(random, &mut bands, 1, BlockState::new("yellow_terracotta"));
    make_bands(random, &mut bands, 2, BlockState::new("brown_terracotta"));
    make_bands(random, &mut bands, 1, BlockState::new("red_terracotta"));

    let white = BlockState::new("white_terracotta");
    let light_gray = BlockState::new("light_gray_terracotta");
    let white_count = random.next_i32_between_inclusive(9, 15);
    let mut placed = 0;
    let mut start = 0;
    while placed < white_count && start < bands.len() {
        bands[start] = white.clone();
        if start > 1 && random.next_bool() {
            bands[start - 1] = light_gray.clone();
        }
        if start + 1 < bands.len() && random.next_bool() {
            bands[start + 1] = light_gray.clone();
        }
        placed += 1;
        start += random.next_u32_bound(16) as usize + 4;
    }
    bands
}

fn make_bands(random: &mut RandomSource, bands: &mut [BlockState], base_width: usize, state: BlockState) {
    let count = random.next_i32_between_inclusive(6, 15);
    for _ in 0..count {
        let width = base_width + random.next_u32_bound(3) as usize;
        let start = random.next_u32_bound(bands.len() as u32) as usize;
        for band in bands.iter_mut().skip(start).take(width) {
            *band = state.clone();
        }
    }
}
