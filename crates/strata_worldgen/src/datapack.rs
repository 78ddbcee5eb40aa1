use crate::density_function::proto::{DensityFunctionHolder, References, Visitor};
use crate::density_function::registry::{DensityFunctionRegistry, GraphBuilder};
use crate::error::WorldgenError;
use crate::noise::{NoiseParam, NoiseRegistry};
use crate::proto::{ConditionSource, NoiseGeneratorSettings, SurfaceRule};
use crate::random_state::RandomState;
use crate::resource_key;
use crate::router::NoiseRouter;
use crate::surface::SurfaceSystem;
use indexmap::IndexSet;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const NOISE_SETTINGS: &str = "noise_settings";
const DENSITY_FUNCTION: &str = "density_function";
const NOISE: &str = "noise";

/// A datapack directory laid out as `data/{namespace}/worldgen/{kind}/{path}.json`.
#[derive(Debug, Clone)]
pub struct Datapack {
    root: PathBuf,
}

/// One noise settings entry with every density function and noise it reaches.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub key: String,
    pub settings: NoiseGeneratorSettings,
    pub functions: DensityFunctionRegistry,
    pub noises: NoiseRegistry,
}

impl Datapack {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, kind: &str, key: &str) -> PathBuf {
        let key = resource_key(key);
        let (namespace, path) = key.split_once(':').unwrap_or(("minecraft", &key));
        self.root
            .join("data")
            .join(namespace)
            .join("worldgen")
            .join(kind)
            .join(format!("{path}.json"))
    }

    /// `None` when the file does not exist.
    fn read<T: DeserializeOwned>(&self, kind: &str, key: &str) -> Result<Option<T>, WorldgenError> {
        let path = self.path_of(kind, key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(WorldgenError::Io { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| WorldgenError::Parse { path, source })
    }

    /// Loads a noise settings entry and, transitively, every density function it references.
    /// Noises fall back to the vanilla table unless the pack defines them.
    pub fn load_settings(&self, key: &str) -> Result<LoadedSettings, WorldgenError> {
        let key = resource_key(key);
        let settings: NoiseGeneratorSettings = self
            .read(NOISE_SETTINGS, &key)?
            .ok_or_else(|| WorldgenError::UnknownSettings(key.clone()))?;

        let mut references = References::default();
        for holder in settings.noise_router.holders() {
            references.visit_holder(holder);
        }
        surface_rule_noises(&settings.surface_rule, &mut references.noises);
        references
            .noises
            .extend(SurfaceSystem::NOISES.iter().map(|noise| noise.key().to_string()));

        let mut functions = DensityFunctionRegistry::new();
        let mut next = 0;
        while let Some(function_key) = references.density_functions.get_index(next).cloned() {
            next += 1;
            let holder: DensityFunctionHolder = self
                .read(DENSITY_FUNCTION, &function_key)?
                .ok_or_else(|| WorldgenError::UnknownDensityFunction(function_key.clone()))?;
            references.visit_holder(&holder);
            functions.register(&function_key, holder)?;
        }

        let mut noises = NoiseRegistry::vanilla();
        let mut overridden = 0;
        for noise_key in &references.noises {
            if let Some(param) = self.read::<NoiseParam>(NOISE, noise_key)? {
                noises.insert(noise_key, param);
                overridden += 1;
            } else if !noises.contains(noise_key) {
                return Err(WorldgenError::UnknownNoise(noise_key.clone()));
            }
        }

        debug!(
            settings = %key,
            functions = functions.len(),
            noises = references.noises.len(),
            overridden,
            "loaded datapack settings"
        );
        Ok(LoadedSettings {
            key,
            settings,
            functions,
            noises,
        })
    }
}

fn surface_rule_noises(rule: &SurfaceRule, noises: &mut IndexSet<String>) {
    match rule {
        SurfaceRule::Bandlands | SurfaceRule::Block { .. } => {}
        SurfaceRule::Sequence { sequence } => {
            for rule in sequence {
                surface_rule_noises(rule, noises);
            }
        }
        SurfaceRule::Condition { if_true, then_run } => {
            condition_noises(if_true, noises);
            surface_rule_noises(then_run, noises);
        }
    }
}

fn condition_noises(condition: &ConditionSource, noises: &mut IndexSet<String>) {
    match condition {
        ConditionSource::NoiseThreshold { noise, .. } => {
            noises.insert(resource_key(noise));
        }
        ConditionSource::Not { invert } => condition_noises(invert, noises),
        _ => {}
    }
}

impl LoadedSettings {
    /// The unwired router.
    pub fn router(&self) -> Result<NoiseRouter, WorldgenError> {
        let mut builder = GraphBuilder::new(&self.functions, &self.noises);
        NoiseRouter::from_proto(&self.settings.noise_router, &mut builder)
    }

    pub fn random_state(&self, seed: i64) -> Result<RandomState, WorldgenError> {
        RandomState::from_settings(&self.settings, &self.router()?, &self.noises, seed)
    }
}

#[cfg(test)]
mod test {
    use crate::datapack::Datapack;
    use crate::error::WorldgenError;
    use crate::noise::NoiseParam;
    use crate::router::NoiseRouter;
    use crate::{DensityFunction, SinglePointContext};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn demo() -> Datapack {
        Datapack::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/demo"))
    }

    fn write(root: &Path, kind: &str, key: &str, value: serde_json::Value) {
        let path = Datapack::new(root).path_of(kind, key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    /// Every root zero except `final_density`.
    fn settings_with(final_density: serde_json::Value) -> serde_json::Value {
        let mut settings: serde_json::Value = serde_json::from_str(include_str!(
            "../../../assets/demo/data/strata/worldgen/noise_settings/overworld.json"
        ))
        .unwrap();
        let mut router = serde_json::Map::new();
        for name in NoiseRouter::ROOT_NAMES {
            router.insert(name.to_string(), json!(0.0));
        }
        router.insert("final_density".into(), final_density);
        settings["noise_router"] = router.into();
        settings
    }

    #[test]
    fn paths_follow_the_datapack_layout() {
        let pack = Datapack::new("/packs/demo");
        assert_eq!(
            pack.path_of("density_function", "strata:overworld/depth"),
            Path::new("/packs/demo/data/strata/worldgen/density_function/overworld/depth.json")
        );
        assert_eq!(
            pack.path_of("noise", "offset"),
            Path::new("/packs/demo/data/minecraft/worldgen/noise/offset.json")
        );
    }

    #[test]
    fn loads_the_demo_pack() {
        let loaded = demo().load_settings("strata:overworld").unwrap();
        assert_eq!(loaded.key, "strata:overworld");
        assert!(loaded.functions.contains("strata:overworld/sloped_cheese"));
        assert!(loaded.functions.contains("strata:overworld/shift_x"));
        let router = loaded.router().unwrap();
        assert!(matches!(*router.continents, DensityFunction::Marker { .. }));

        let state = loaded.random_state(12345).unwrap();
        let ctx = SinglePointContext::new(0, 64, 0);
        let value = state.router().final_density.compute(&ctx);
        assert!(value.is_finite());
        assert_eq!(value, loaded.random_state(12345).unwrap().router().final_density.compute(&ctx));
    }

    #[test]
    fn references_resolve_transitively() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "noise_settings",
            "test:world",
            settings_with(json!({ "type": "minecraft:abs", "argument": "test:outer" })),
        );
        write(dir.path(), "density_function", "test:outer", json!({
            "type": "minecraft:add", "argument1": "test:inner", "argument2": "test:inner"
        }));
        write(dir.path(), "density_function", "test:inner", json!({
            "type": "minecraft:noise", "noise": "test:bumps", "xz_scale": 1.0, "y_scale": 1.0
        }));
        write(dir.path(), "noise", "test:bumps", json!({ "firstOctave": -4, "amplitudes": [1.0, 1.0] }));
        write(dir.path(), "noise", "minecraft:surface", json!({ "firstOctave": -2, "amplitudes": [1.0] }));

        let loaded = Datapack::new(dir.path()).load_settings("test:world").unwrap();
        assert_eq!(loaded.functions.len(), 2);
        assert_eq!(loaded.noises.get("test:bumps"), Some(&NoiseParam::new(-4, vec![1.0, 1.0])));
        assert_eq!(loaded.noises.get("minecraft:surface"), Some(&NoiseParam::new(-2, vec![1.0])));
        assert_eq!(loaded.noises.get("minecraft:gravel"), Some(&NoiseParam::new(-8, vec![1.0; 4])));

        let router = loaded.router().unwrap();
        let DensityFunction::Mapped { input, .. } = &*router.final_density else {
            panic!("expected abs, got {:?}", router.final_density);
        };
        let DensityFunction::TwoArgument { argument1, argument2, .. } = &**input else {
            panic!("expected add, got {input:?}");
        };
        assert!(Arc::ptr_eq(argument1, argument2));
        assert!(loaded.random_state(1).is_ok());
    }

    #[test]
    fn missing_entries_are_reported() {
        let dir = tempdir().unwrap();
        let pack = Datapack::new(dir.path());
        assert!(matches!(
            pack.load_settings("test:nowhere"),
            Err(WorldgenError::UnknownSettings(key)) if key == "test:nowhere"
        ));

        write(dir.path(), "noise_settings", "test:world", settings_with(json!("test:missing")));
        assert!(matches!(
            pack.load_settings("test:world"),
            Err(WorldgenError::UnknownDensityFunction(key)) if key == "test:missing"
        ));

        write(
            dir.path(),
            "noise_settings",
            "test:noisy",
            settings_with(json!({ "type": "minecraft:noise", "noise": "test:static", "xz_scale": 1.0, "y_scale": 1.0 })),
        );
        assert!(matches!(
            pack.load_settings("test:noisy"),
            Err(WorldgenError::UnknownNoise(key)) if key == "test:static"
        ));

        let broken = pack.path_of("noise_settings", "test:broken");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(pack.load_settings("test:broken"), Err(WorldgenError::Parse { path, .. }) if path == broken));
    }
}
