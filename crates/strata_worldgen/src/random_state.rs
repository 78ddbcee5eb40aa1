use crate::climate::{ParamPoint, Sampler};
use crate::density_function::{
    DensityFunction, DensityFunctionRef, GraphMapper, NoiseHolder, Visitor,
};
use crate::density_function::end_islands::EndIslands;
use crate::error::WorldgenError;
use crate::noise::normal_noise::NormalNoise;
use crate::noise::{NoiseParam, NoiseRegistry, Noises};
use crate::proto::NoiseGeneratorSettings;
use crate::resource_key;
use crate::router::NoiseRouter;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use strata_random::legacy::LegacyRandom;
use strata_random::{PositionalRandomFactory, Random, RandomSource};
use tracing::debug;

/// Everything derived from one world seed: the wired router, the climate sampler, and memoised
/// noise instances and positional factories.
///
/// The caches only ever grow and every entry is a pure function of the seed and its key, so
/// concurrent lookups may race to build an entry and keep whichever lands first.
pub struct RandomState {
    seed: i64,
    legacy: bool,
    random: PositionalRandomFactory,
    aquifer_random: PositionalRandomFactory,
    ore_random: PositionalRandomFactory,
    noises: NoiseRegistry,
    noise_instances: RwLock<FxHashMap<String, Arc<NormalNoise>>>,
    positional_randoms: RwLock<FxHashMap<String, PositionalRandomFactory>>,
    router: NoiseRouter,
    sampler: Sampler,
}

impl RandomState {
    pub fn new(
        router: &NoiseRouter,
        noises: &NoiseRegistry,
        seed: i64,
        legacy: bool,
    ) -> Result<Self, WorldgenError> {
        Self::with_spawn_target(router, noises, seed, legacy, Vec::new())
    }

    pub fn from_settings(
        settings: &NoiseGeneratorSettings,
        router: &NoiseRouter,
        noises: &NoiseRegistry,
        seed: i64,
    ) -> Result<Self, WorldgenError> {
        Self::with_spawn_target(
            router,
            noises,
            seed,
            settings.legacy_random_source,
            settings.spawn_target.clone(),
        )
    }

    fn with_spawn_target(
        router: &NoiseRouter,
        noises: &NoiseRegistry,
        seed: i64,
        legacy: bool,
        spawn_target: Vec<ParamPoint>,
    ) -> Result<Self, WorldgenError> {
        let random = RandomSource::new(seed, legacy).fork_positional();
        let aquifer_random = random.from_hash_of("minecraft:aquifer").fork_positional();
        let ore_random = random.from_hash_of("minecraft:ore").fork_positional();
        let mut state = Self {
            seed,
            legacy,
            random,
            aquifer_random,
            ore_random,
            noises: noises.clone(),
            noise_instances: RwLock::new(FxHashMap::default()),
            positional_randoms: RwLock::new(FxHashMap::default()),
            router: router.clone(),
            sampler: Sampler {
                temperature: DensityFunction::zero(),
                humidity: DensityFunction::zero(),
                continentalness: DensityFunction::zero(),
                erosion: DensityFunction::zero(),
                depth: DensityFunction::zero(),
                weirdness: DensityFunction::zero(),
                spawn_target: Vec::new(),
            },
        };

        let mut mapper = GraphMapper::new(NoiseWiring::new(&state));
        let wired = router.map_all(&mut mapper)?;
        let wiring = mapper.into_inner();
        debug!(
            seed,
            legacy,
            noises = wiring.wired_noises,
            blended = wiring.reseeded,
            "wired noise router"
        );
        state.sampler = Sampler::new(&wired, spawn_target)?;
        state.router = wired;
        Ok(state)
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub fn router(&self) -> &NoiseRouter {
        &self.router
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn random(&self) -> &PositionalRandomFactory {
        &self.random
    }

    pub fn aquifer_random(&self) -> &PositionalRandomFactory {
        &self.aquifer_random
    }

    pub fn ore_random(&self) -> &PositionalRandomFactory {
        &self.ore_random
    }

    /// Binds an arbitrary unwired graph to this seed.
    pub fn wire(&self, function: &DensityFunctionRef) -> Result<DensityFunctionRef, WorldgenError> {
        DensityFunction::map_all(function, NoiseWiring::new(self))
    }

    pub fn get_or_create_noise(&self, key: &str) -> Result<Arc<NormalNoise>, WorldgenError> {
        let key = resource_key(key);
        if let Some(noise) = self.noise_instances.read().get(&key) {
            return Ok(noise.clone());
        }
        let param = self
            .noises
            .get(&key)
            .ok_or_else(|| WorldgenError::UnknownNoise(key.clone()))?;
        let noise = NormalNoise::new(&mut self.random.from_hash_of(&key), param)
            .map_err(|source| WorldgenError::InvalidNoise {
                key: key.clone(),
                source,
            })?;
        let mut instances = self.noise_instances.write();
        Ok(instances.entry(key).or_insert_with(|| Arc::new(noise)).clone())
    }

    pub fn get_or_create_random_factory(&self, name: &str) -> PositionalRandomFactory {
        let name = resource_key(name);
        if let Some(factory) = self.positional_randoms.read().get(&name) {
            return factory.clone();
        }
        let factory = self.random.from_hash_of(&name).fork_positional();
        self.positional_randoms
            .write()
            .entry(name)
            .or_insert(factory)
            .clone()
    }

    fn legacy_noise(&self, offset: i64, param: &NoiseParam, key: &str) -> Result<Arc<NormalNoise>, WorldgenError> {
        let mut random = LegacyRandom::new(self.seed.wrapping_add(offset));
        NormalNoise::new_legacy(&mut random, param)
            .map(Arc::new)
            .map_err(|source| WorldgenError::InvalidNoise {
                key: key.to_string(),
                source,
            })
    }
}

/// Binds noise leaves to seeded instances and re-seeds the noises that carry their own state.
struct NoiseWiring<'a> {
    state: &'a RandomState,
    wired_noises: usize,
    reseeded: usize,
}

impl<'a> NoiseWiring<'a> {
    fn new(state: &'a RandomState) -> Self {
        Self {
            state,
            wired_noises: 0,
            reseeded: 0,
        }
    }
}

impl Visitor for NoiseWiring<'_> {
    fn apply(&mut self, function: DensityFunctionRef) -> Result<DensityFunctionRef, WorldgenError> {
        Ok(match &*function {
            DensityFunction::OldBlendedNoise(noise) => {
                self.reseeded += 1;
                let reseeded = if self.state.legacy {
                    noise.with_random(&mut LegacyRandom::new(self.state.seed))
                } else {
                    noise.with_random(&mut self.state.random.from_hash_of("minecraft:terrain"))
                };
                let reseeded = reseeded.map_err(|source| WorldgenError::InvalidNoise {
                    key: "minecraft:terrain".to_string(),
                    source,
                })?;
                Arc::new(DensityFunction::OldBlendedNoise(Box::new(reseeded)))
            }
            DensityFunction::EndIslands(_) => {
                self.reseeded += 1;
                Arc::new(DensityFunction::EndIslands(Box::new(EndIslands::new(self.state.seed))))
            }
            _ => function,
        })
    }

    fn visit_noise(&mut self, noise: &NoiseHolder) -> Result<NoiseHolder, WorldgenError> {
        self.wired_noises += 1;
        let key = resource_key(noise.key());
        if self.state.legacy {
            match Noises::from_key(&key) {
                Some(Noises::Temperature) => {
                    let param = NoiseParam::new(-7, vec![1.0, 1.0]);
                    return Ok(NoiseHolder::wired(key.clone(), self.state.legacy_noise(0, &param, &key)?));
                }
                Some(Noises::Vegetation) => {
                    let param = NoiseParam::new(-7, vec![1.0, 1.0]);
                    return Ok(NoiseHolder::wired(key.clone(), self.state.legacy_noise(1, &param, &key)?));
                }
                Some(Noises::Offset) => {
                    let param = NoiseParam::new(0, vec![0.0]);
                    let noise = NormalNoise::new(&mut self.state.random.from_hash_of(&key), &param)
                        .map_err(|source| WorldgenError::InvalidNoise {
                            key: key.clone(),
                            source,
                        })?;
                    return Ok(NoiseHolder::wired(key, Arc::new(noise)));
                }
                _ => {}
            }
        }
        let instance = self.state.get_or_create_noise(&key)?;
        Ok(NoiseHolder::wired(key, instance))
    }
}
