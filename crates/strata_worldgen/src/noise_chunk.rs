use crate::chunk::ProtoChunk;
use crate::density_function::{
    DensityFunction, DensityFunctionRef, FunctionContext, MarkerKind, SinglePointContext,
};
use crate::math::{floor_div, lerp, quart_from_block, quart_to_block};
use crate::proto::{BlockState, NoiseGeneratorSettings, NoiseSettings};
use crate::router::NoiseRouter;
use bevy_math::IVec3;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::Arc;
use tracing::debug_span;

const CHUNK_SIZE: i32 = 16;

type CacheKey = (MarkerKind, usize);

struct MarkerCache {
    // pins the node so its address cannot be handed to another node while cached
    _wrapped: DensityFunctionRef,
    values: FxHashMap<IVec3, f64>,
    cell: Option<IVec3>,
}

/// How much of a marker's history survives a new entry.
#[derive(Clone, Copy)]
enum Retention {
    All,
    Last,
    Cell(IVec3),
}

/// Per-chunk evaluation state. Markers reached through a [`ChunkContext`] memoise their wrapped
/// function here; every cache is keyed by the identity of the node it wraps, so a node shared
/// between several roots is cached once.
///
/// Owned by one worker at a time.
pub struct NoiseChunk {
    start_x: i32,
    start_z: i32,
    noise: NoiseSettings,
    caches: RefCell<FxHashMap<CacheKey, MarkerCache>>,
    preliminary_surface: RefCell<FxHashMap<(i32, i32), i32>>,
}

impl NoiseChunk {
    pub fn new(chunk_x: i32, chunk_z: i32, noise: NoiseSettings) -> Self {
        Self {
            start_x: chunk_x * CHUNK_SIZE,
            start_z: chunk_z * CHUNK_SIZE,
            noise,
            caches: RefCell::new(FxHashMap::default()),
            preliminary_surface: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn for_chunk(chunk: &ProtoChunk, noise: NoiseSettings) -> Self {
        Self::new(chunk.pos().x, chunk.pos().y, noise)
    }

    pub fn start_x(&self) -> i32 {
        self.start_x
    }

    pub fn start_z(&self) -> i32 {
        self.start_z
    }

    pub fn noise_settings(&self) -> &NoiseSettings {
        &self.noise
    }

    /// Number of marker nodes that have cached anything so far.
    pub fn cache_count(&self) -> usize {
        self.caches.borrow().len()
    }

    /// Evaluates `function` at a block position with this chunk's caches in play.
    pub fn compute(&self, function: &DensityFunction, x: i32, y: i32, z: i32) -> f64 {
        function.compute(&ChunkContext {
            chunk: self,
            pos: IVec3::new(x, y, z),
        })
    }

    pub(crate) fn compute_marker(
        &self,
        kind: MarkerKind,
        wrapped: &DensityFunctionRef,
        ctx: &dyn FunctionContext,
    ) -> f64 {
        let key = (kind, Arc::as_ptr(wrapped) as usize);
        let pos = ctx.pos();
        match kind {
            MarkerKind::Interpolated => self.interpolate(key, wrapped, pos),
            MarkerKind::FlatCache => {
                let quart_x = quart_from_block(pos.x) - quart_from_block(self.start_x);
                let quart_z = quart_from_block(pos.z) - quart_from_block(self.start_z);
                let size = quart_from_block(CHUNK_SIZE);
                if !(0..=size).contains(&quart_x) || !(0..=size).contains(&quart_z) {
                    return wrapped.compute(ctx);
                }
                let column = IVec3::new(
                    quart_to_block(quart_from_block(pos.x)),
                    0,
                    quart_to_block(quart_from_block(pos.z)),
                );
                self.cached(key, wrapped, column, Retention::All, || {
                    wrapped.compute(&SinglePointContext::from(column))
                })
            }
            MarkerKind::Cache2D => {
                let column = IVec3::new(pos.x, 0, pos.z);
                self.cached(key, wrapped, column, Retention::Last, || wrapped.compute(ctx))
            }
            MarkerKind::CacheOnce => {
                self.cached(key, wrapped, pos, Retention::Last, || wrapped.compute(ctx))
            }
            MarkerKind::CacheAllInCell => {
                let cell = self.cell_of(pos);
                self.cached(key, wrapped, pos, Retention::Cell(cell), || wrapped.compute(ctx))
            }
        }
    }

    fn cell_of(&self, pos: IVec3) -> IVec3 {
        IVec3::new(
            floor_div(pos.x, self.noise.cell_width()),
            floor_div(pos.y, self.noise.cell_height()),
            floor_div(pos.z, self.noise.cell_width()),
        )
    }

    fn cached(
        &self,
        key: CacheKey,
        wrapped: &DensityFunctionRef,
        slot: IVec3,
        retention: Retention,
        compute: impl FnOnce() -> f64,
    ) -> f64 {
        if let Some(value) = self
            .caches
            .borrow()
            .get(&key)
            .and_then(|cache| cache.values.get(&slot))
        {
            return *value;
        }
        // the borrow is released so nested markers can reach the cache table
        let value = compute();
        let mut caches = self.caches.borrow_mut();
        let cache = caches.entry(key).or_insert_with(|| MarkerCache {
            _wrapped: wrapped.clone(),
            values: FxHashMap::default(),
            cell: None,
        });
        match retention {
            Retention::All => {}
            Retention::Last => cache.values.clear(),
            Retention::Cell(cell) => {
                if cache.cell != Some(cell) {
                    cache.values.clear();
                    cache.cell = Some(cell);
                }
            }
        }
        cache.values.insert(slot, value);
        value
    }

    /// Trilinear blend of the wrapped function sampled at the eight corners of the enclosing
    /// cell, along y first, then x, then z.
    fn interpolate(&self, key: CacheKey, wrapped: &DensityFunctionRef, pos: IVec3) -> f64 {
        let width = self.noise.cell_width();
        let height = self.noise.cell_height();
        let origin = self.cell_of(pos) * IVec3::new(width, height, width);
        let corner = |dx: i32, dy: i32, dz: i32| {
            let corner = origin + IVec3::new(dx * width, dy * height, dz * width);
            self.cached(key, wrapped, corner, Retention::All, || {
                wrapped.compute(&ChunkContext { chunk: self, pos: corner })
            })
        };
        let delta_x = (pos.x - origin.x) as f64 / width as f64;
        let delta_y = (pos.y - origin.y) as f64 / height as f64;
        let delta_z = (pos.z - origin.z) as f64 / width as f64;

        let x0z0 = lerp(delta_y, corner(0, 0, 0), corner(0, 1, 0));
        let x1z0 = lerp(delta_y, corner(1, 0, 0), corner(1, 1, 0));
        let x0z1 = lerp(delta_y, corner(0, 0, 1), corner(0, 1, 1));
        let x1z1 = lerp(delta_y, corner(1, 0, 1), corner(1, 1, 1));
        let z0 = lerp(delta_x, x0z0, x1z0);
        let z1 = lerp(delta_x, x0z1, x1z1);
        lerp(delta_z, z0, z1)
    }

    /// Rough terrain height of the quart column holding `(x, z)`.
    pub fn preliminary_surface_level(&self, router: &NoiseRouter, x: i32, z: i32) -> i32 {
        let column = (
            quart_to_block(quart_from_block(x)),
            quart_to_block(quart_from_block(z)),
        );
        if let Some(level) = self.preliminary_surface.borrow().get(&column) {
            return *level;
        }
        let level = router
            .preliminary_surface_level
            .compute(&SinglePointContext::new(column.0, 0, column.1))
            .floor() as i32;
        self.preliminary_surface.borrow_mut().insert(column, level);
        level
    }

    /// Places the default block wherever the final density is positive, fluid below sea level
    /// and lava below `min(-54, sea_level)`.
    pub fn fill(&self, router: &NoiseRouter, settings: &NoiseGeneratorSettings, chunk: &mut ProtoChunk) {
        let _span = debug_span!("fill", x = chunk.pos().x, z = chunk.pos().y).entered();
        let lava_level = settings.sea_level.min(-54);
        let lava = BlockState::lava();
        let min_y = chunk.min_y().max(self.noise.min_y);
        let max_y = chunk.max_y().min(self.noise.max_y());
        for local_z in 0..CHUNK_SIZE {
            let z = self.start_z + local_z;
            for local_x in 0..CHUNK_SIZE {
                let x = self.start_x + local_x;
                for y in (min_y..max_y).rev() {
                    let density = self.compute(&router.final_density, x, y, z);
                    let state = if density > 0.0 {
                        &settings.default_block
                    } else if y < lava_level {
                        &lava
                    } else if y < settings.sea_level {
                        &settings.default_fluid
                    } else {
                        continue;
                    };
                    chunk.set_block_state(x, y, z, state);
                }
            }
        }
    }
}

/// A block position evaluated inside a [`NoiseChunk`].
#[derive(Clone, Copy)]
pub struct ChunkContext<'a> {
    pub chunk: &'a NoiseChunk,
    pub pos: IVec3,
}

impl FunctionContext for ChunkContext<'_> {
    fn block_x(&self) -> i32 {
        self.pos.x
    }

    fn block_y(&self) -> i32 {
        self.pos.y
    }

    fn block_z(&self) -> i32 {
        self.pos.z
    }

    fn pos(&self) -> IVec3 {
        self.pos
    }

    fn noise_chunk(&self) -> Option<&NoiseChunk> {
        Some(self.chunk)
    }
}

#[cfg(test)]
mod test {
    use crate::chunk::{Heightmap, ProtoChunk};
    use crate::density_function::{DensityFunction, DensityFunctionRef, NoiseHolder, SinglePointContext};
    use crate::noise::NoiseRegistry;
    use crate::noise_chunk::NoiseChunk;
    use crate::proto::{BlockState, NoiseGeneratorSettings, NoiseSettings};
    use crate::random_state::RandomState;
    use crate::router::NoiseRouter;

    const NOISE: NoiseSettings = NoiseSettings {
        min_y: -64,
        height: 384,
        size_horizontal: 1,
        size_vertical: 2,
    };

    fn wired(function: DensityFunctionRef) -> DensityFunctionRef {
        let router = crate::router::test_support::constant_router();
        let state = RandomState::new(&router, &NoiseRegistry::vanilla(), 12345, false).unwrap();
        state.wire(&function).unwrap()
    }

    fn continentalness() -> DensityFunctionRef {
        DensityFunction::noise(NoiseHolder::new("minecraft:continentalness"), 0.25, 0.0)
    }

    fn ridges() -> DensityFunctionRef {
        DensityFunction::noise(NoiseHolder::new("minecraft:ridge"), 1.0, 1.0)
    }

    #[test]
    fn exact_caches_are_transparent() {
        let flat = wired(continentalness());
        let solid = wired(ridges());
        let cached = DensityFunction::add(
            DensityFunction::cache_2d(flat.clone()),
            DensityFunction::cache_once(DensityFunction::cache_all_in_cell(solid.clone())),
        );
        let chunk = NoiseChunk::new(3, -2, NOISE);
        for (x, y, z) in [(48, 70, -32), (48, 70, -32), (49, 70, -32), (55, -10, -20), (48, 71, -32)] {
            let ctx = SinglePointContext::new(x, y, z);
            let expected = flat.compute(&ctx) + solid.compute(&ctx);
            assert_eq!(chunk.compute(&cached, x, y, z), expected);
        }
        assert_eq!(chunk.cache_count(), 3);
    }

    #[test]
    fn interpolation_is_exact_at_corners() {
        let noise = wired(ridges());
        let interpolated = DensityFunction::interpolated(noise.clone());
        let chunk = NoiseChunk::new(0, 0, NOISE);
        for (x, y, z) in [(0, 64, 0), (4, 64, 8), (12, 0, 4), (16, -64, 16)] {
            assert_eq!(
                chunk.compute(&interpolated, x, y, z),
                noise.compute(&SinglePointContext::new(x, y, z))
            );
        }
        let mut low = f64::MAX;
        let mut high = f64::MIN;
        for x in [0, 4] {
            for y in [64, 72] {
                for z in [0, 4] {
                    let corner = noise.compute(&SinglePointContext::new(x, y, z));
                    low = low.min(corner);
                    high = high.max(corner);
                }
            }
        }
        let inside = chunk.compute(&interpolated, 2, 67, 1);
        assert!(inside >= low - 1.0e-12 && inside <= high + 1.0e-12);
    }

    #[test]
    fn interpolation_reproduces_linear_functions() {
        let gradient = DensityFunction::y_clamped_gradient(-64, 320, 1.0, -1.0);
        let interpolated = DensityFunction::interpolated(gradient.clone());
        let chunk = NoiseChunk::new(-1, 5, NOISE);
        for y in -64..120 {
            let direct = gradient.compute(&SinglePointContext::new(-7, y, 83));
            let blended = chunk.compute(&interpolated, -7, y, 83);
            assert!((direct - blended).abs() < 1.0e-12, "y {y}: {direct} vs {blended}");
        }
    }

    #[test]
    fn flat_cache_samples_the_quart_grid() {
        let noise = wired(continentalness());
        let flat = DensityFunction::flat_cache(noise.clone());
        let chunk = NoiseChunk::new(0, 0, NOISE);
        assert_eq!(
            chunk.compute(&flat, 5, 100, 14),
            noise.compute(&SinglePointContext::new(4, 0, 12))
        );
        assert_eq!(
            chunk.compute(&flat, 16, 0, 16),
            noise.compute(&SinglePointContext::new(16, 0, 16))
        );
        // outside the chunk the wrapped function is evaluated directly
        assert_eq!(
            chunk.compute(&flat, 41, 30, 3),
            noise.compute(&SinglePointContext::new(41, 30, 3))
        );
    }

    #[test]
    fn shared_markers_share_one_cache() {
        let marker = DensityFunction::cache_2d(wired(continentalness()));
        let doubled = DensityFunction::add(marker.clone(), marker);
        let chunk = NoiseChunk::new(0, 0, NOISE);
        chunk.compute(&doubled, 1, 2, 3);
        assert_eq!(chunk.cache_count(), 1);
    }

    #[test]
    fn fill_places_stone_fluid_and_lava() {
        let router = NoiseRouter {
            final_density: DensityFunction::interpolated(DensityFunction::y_clamped_gradient(
                0, 128, 63.5, -64.5,
            )),
            ..crate::router::test_support::constant_router()
        };
        let settings: NoiseGeneratorSettings = serde_json::from_str(include_str!(
            "../../../assets/demo/data/strata/worldgen/noise_settings/overworld.json"
        ))
        .unwrap();
        let mut chunk = ProtoChunk::new(0, 0, -64, 384);
        let noise_chunk = NoiseChunk::for_chunk(&chunk, NOISE);
        noise_chunk.fill(&router, &settings, &mut chunk);
        // density is 63.5 - y above y = 0
        assert_eq!(chunk.block_state(3, 63, 3), &BlockState::new("stone"));
        assert!(chunk.block_state(3, 64, 3).is_air());
        assert_eq!(chunk.height_at(Heightmap::WorldSurfaceWg, 3, 3), 64);

        let mut flooded = ProtoChunk::new(0, 0, -64, 384);
        let router = NoiseRouter {
            final_density: DensityFunction::constant(-1.0),
            ..router
        };
        noise_chunk.fill(&router, &settings, &mut flooded);
        assert_eq!(flooded.block_state(0, 62, 0), &settings.default_fluid);
        assert!(flooded.block_state(0, 63, 0).is_air());
        assert_eq!(flooded.block_state(0, -55, 0), &BlockState::lava());
        assert_eq!(flooded.block_state(0, -54, 0), &settings.default_fluid);
    }

    #[test]
    fn preliminary_surface_is_cached_per_quart_column() {
        let router = NoiseRouter {
            preliminary_surface_level: DensityFunction::constant(70.9),
            ..crate::router::test_support::constant_router()
        };
        let chunk = NoiseChunk::new(0, 0, NOISE);
        assert_eq!(chunk.preliminary_surface_level(&router, 5, 7), 70);
        assert_eq!(chunk.preliminary_surface_level(&router, 6, 6), 70);
    }
}
