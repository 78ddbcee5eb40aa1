use crate::density_function::registry::GraphBuilder;
use crate::density_function::{DensityFunctionRef, GraphMapper, Visitor};
use crate::error::WorldgenError;
use crate::proto::ProtoNoiseRouter;

macro_rules! noise_router {
    ($($field:ident),* $(,)?) => {
        /// The named roots downstream stages read from. Built once unwired from settings, then
        /// once per seed by the random state.
        #[derive(Debug, Clone)]
        pub struct NoiseRouter {
            $(pub $field: DensityFunctionRef,)*
        }

        impl NoiseRouter {
            pub const ROOT_NAMES: &'static [&'static str] = &[$(stringify!($field)),*];

            pub fn from_proto(
                proto: &ProtoNoiseRouter,
                builder: &mut GraphBuilder,
            ) -> Result<Self, WorldgenError> {
                Ok(Self {
                    $($field: builder.build(&proto.$field)?,)*
                })
            }

            /// Rewrites every root through one mapper so nodes shared between roots stay shared.
            pub fn map_all<V: Visitor>(&self, mapper: &mut GraphMapper<V>) -> Result<Self, WorldgenError> {
                Ok(Self {
                    $($field: mapper.map(&self.$field)?,)*
                })
            }

            pub fn roots(&self) -> impl Iterator<Item = (&'static str, &DensityFunctionRef)> {
                [$((stringify!($field), &self.$field)),*].into_iter()
            }

            pub fn get(&self, name: &str) -> Option<&DensityFunctionRef> {
                self.roots().find(|(root, _)| *root == name).map(|(_, function)| function)
            }
        }
    };
}

noise_router!(
    barrier,
    fluid_level_floodedness,
    fluid_level_spread,
    lava,
    temperature,
    vegetation,
    continents,
    erosion,
    depth,
    ridges,
    preliminary_surface_level,
    final_density,
    vein_toggle,
    vein_ridged,
    vein_gap,
);

#[cfg(test)]
pub(crate) mod test_support {
    use crate::density_function::registry::{DensityFunctionRegistry, GraphBuilder};
    use crate::noise::NoiseRegistry;
    use crate::proto::ProtoNoiseRouter;
    use crate::router::NoiseRouter;

    /// Every root zero except the ones named in `overrides`.
    pub(crate) fn proto_router(overrides: serde_json::Value) -> ProtoNoiseRouter {
        let mut roots = serde_json::Map::new();
        for name in NoiseRouter::ROOT_NAMES {
            roots.insert(name.to_string(), serde_json::json!(0.0));
        }
        if let serde_json::Value::Object(overrides) = overrides {
            roots.extend(overrides);
        }
        serde_json::from_value(roots.into()).unwrap()
    }

    pub(crate) fn router(overrides: serde_json::Value) -> NoiseRouter {
        let functions = DensityFunctionRegistry::new();
        let noises = NoiseRegistry::vanilla();
        NoiseRouter::from_proto(&proto_router(overrides), &mut GraphBuilder::new(&functions, &noises))
            .unwrap()
    }

    pub(crate) fn constant_router() -> NoiseRouter {
        router(serde_json::json!({}))
    }
}

#[cfg(test)]
mod test {
    use crate::density_function::registry::{DensityFunctionRegistry, GraphBuilder};
    use crate::density_function::{DensityFunction, DensityFunctionRef, GraphMapper, Visitor};
    use crate::error::WorldgenError;
    use crate::noise::NoiseRegistry;
    use crate::proto::ProtoNoiseRouter;
    use crate::router::{NoiseRouter, test_support};
    use serde_json::json;
    use std::sync::Arc;

    fn proto() -> ProtoNoiseRouter {
        test_support::proto_router(json!({
            "ridges": "minecraft:overworld/ridges",
            "depth": { "type": "minecraft:abs", "argument": "minecraft:overworld/ridges" }
        }))
    }

    struct Count(usize);

    impl Visitor for Count {
        fn apply(&mut self, function: DensityFunctionRef) -> Result<DensityFunctionRef, WorldgenError> {
            self.0 += 1;
            Ok(function)
        }
    }

    #[test]
    fn roots_share_nodes_across_mapping() {
        let mut functions = DensityFunctionRegistry::new();
        functions
            .register(
                "overworld/ridges",
                serde_json::from_value(json!({
                    "type": "minecraft:y_clamped_gradient",
                    "from_y": 0, "to_y": 10, "from_value": -1.0, "to_value": 1.0
                }))
                .unwrap(),
            )
            .unwrap();
        let noises = NoiseRegistry::vanilla();
        let mut builder = GraphBuilder::new(&functions, &noises);
        let router = NoiseRouter::from_proto(&proto(), &mut builder).unwrap();
        assert_eq!(router.roots().count(), 15);

        let mut mapper = GraphMapper::new(Count(0));
        let mapped = router.map_all(&mut mapper).unwrap();
        // 13 constants, the shared gradient and its abs
        assert_eq!(mapper.visitor().0, 15);
        let DensityFunction::Mapped { input, .. } = &*mapped.depth else {
            panic!("expected abs, got {:?}", mapped.depth);
        };
        assert!(Arc::ptr_eq(input, &mapped.ridges));
        assert!(router.get("final_density").is_some());
        assert!(router.get("initial_density").is_none());
    }
}
