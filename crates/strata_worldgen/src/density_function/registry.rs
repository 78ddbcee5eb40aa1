use crate::density_function::end_islands::EndIslands;
use crate::density_function::proto::{
    DensityFunctionHolder, ProtoDensityFunction, ProtoNoiseHolder, SplineHolder,
};
use crate::density_function::{
    DensityFunction, DensityFunctionRef, DensitySpline, MappedOp, MarkerKind, NoiseHolder,
    SplineCoordinate, TwoArgumentOp,
};
use crate::error::WorldgenError;
use crate::noise::NoiseRegistry;
use crate::noise::blended_noise::BlendedNoise;
use crate::resource_key;
use crate::spline::{Builder, CubicSpline};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// Density function definitions by key, as loaded from settings.
#[derive(Clone, Debug, Default)]
pub struct DensityFunctionRegistry {
    entries: IndexMap<String, DensityFunctionHolder>,
}

impl DensityFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: &str, function: DensityFunctionHolder) -> Result<(), WorldgenError> {
        let key = resource_key(key);
        if self.entries.contains_key(&key) {
            return Err(WorldgenError::DuplicateKey(key));
        }
        self.entries.insert(key, function);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&DensityFunctionHolder> {
        self.entries.get(&resource_key(key))
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

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Turns proto graphs into unwired density functions. Every registry key is built at most
/// once, so two references to the same key share one node.
pub struct GraphBuilder<'a> {
    functions: &'a DensityFunctionRegistry,
    noises: &'a NoiseRegistry,
    built: FxHashMap<String, DensityFunctionRef>,
    resolving: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(functions: &'a DensityFunctionRegistry, noises: &'a NoiseRegistry) -> Self {
        Self {
            functions,
            noises,
            built: FxHashMap::default(),
            resolving: Vec::new(),
        }
    }

    pub fn noises(&self) -> &'a NoiseRegistry {
        self.noises
    }

    /// Number of registry entries built so far.
    pub fn built_count(&self) -> usize {
        self.built.len()
    }

    pub fn resolve(&mut self, key: &str) -> Result<DensityFunctionRef, WorldgenError> {
        let key = resource_key(key);
        if let Some(function) = self.built.get(&key) {
            return Ok(function.clone());
        }
        if self.resolving.contains(&key) {
            return Err(WorldgenError::ReferenceCycle(key));
        }
        let functions = self.functions;
        let holder = functions
            .get(&key)
            .ok_or_else(|| WorldgenError::UnknownDensityFunction(key.clone()))?;
        self.resolving.push(key.clone());
        let function = self.build(holder);
        self.resolving.pop();
        let function = function?;
        debug!(key = %key, "built density function");
        self.built.insert(key, function.clone());
        Ok(function)
    }

    pub fn build(&mut self, holder: &DensityFunctionHolder) -> Result<DensityFunctionRef, WorldgenError> {
        match holder {
            DensityFunctionHolder::Value(value) => Ok(DensityFunction::constant(*value)),
            DensityFunctionHolder::Reference(key) => self.resolve(key),
            DensityFunctionHolder::Owned(function) => self.build_function(function),
        }
    }

    fn noise(&self, holder: &ProtoNoiseHolder) -> Result<NoiseHolder, WorldgenError> {
        match holder {
            ProtoNoiseHolder::Reference(key) => {
                let key = resource_key(key);
                if !self.noises.contains(&key) {
                    return Err(WorldgenError::UnknownNoise(key));
                }
                Ok(NoiseHolder::new(key))
            }
            ProtoNoiseHolder::Owned(_) => Err(WorldgenError::InlineNoise),
        }
    }

    fn spline(&mut self, holder: &SplineHolder) -> Result<DensitySpline, WorldgenError> {
        match holder {
            SplineHolder::Constant(value) => Ok(CubicSpline::Constant(*value)),
            SplineHolder::Spline(spline) => {
                let coordinate = SplineCoordinate(self.build(&spline.coordinate)?);
                let mut builder = Builder::new(coordinate);
                for point in &spline.points {
                    let value = self.spline(&point.value)?;
                    builder = builder.add_point(point.location, value, point.derivative)?;
                }
                Ok(builder.build()?)
            }
        }
    }

    fn build_function(&mut self, function: &ProtoDensityFunction) -> Result<DensityFunctionRef, WorldgenError> {
        use ProtoDensityFunction as P;
        let marker = |kind, wrapped| DensityFunction::marker(kind, wrapped);
        Ok(match function {
            P::BlendAlpha => Arc::new(DensityFunction::BlendAlpha),
            P::BlendOffset => Arc::new(DensityFunction::BlendOffset),
            P::Beardifier => Arc::new(DensityFunction::Beardifier),
            P::OldBlendedNoise {
                xz_scale,
                y_scale,
                xz_factor,
                y_factor,
                smear_scale_multiplier,
            } => {
                let noise = BlendedNoise::unseeded(
                    *xz_scale,
                    *y_scale,
                    *xz_factor,
                    *y_factor,
                    *smear_scale_multiplier,
                )
                .map_err(|source| WorldgenError::InvalidNoise {
                    key: "minecraft:old_blended_noise".to_string(),
                    source,
                })?;
                Arc::new(DensityFunction::OldBlendedNoise(Box::new(noise)))
            }
            P::Interpolated(f) => marker(MarkerKind::Interpolated, self.build(&f.argument)?),
            P::FlatCache(f) => marker(MarkerKind::FlatCache, self.build(&f.argument)?),
            P::Cache2d(f) => marker(MarkerKind::Cache2D, self.build(&f.argument)?),
            P::CacheOnce(f) => marker(MarkerKind::CacheOnce, self.build(&f.argument)?),
            P::CacheAllInCell(f) => marker(MarkerKind::CacheAllInCell, self.build(&f.argument)?),
            P::Noise {
                noise,
                xz_scale,
                y_scale,
            } => DensityFunction::noise(self.noise(noise)?, *xz_scale, *y_scale),
            P::EndIslands => Arc::new(DensityFunction::EndIslands(Box::new(EndIslands::new(0)))),
            P::WeirdScaledSampler {
                input,
                noise,
                rarity_value_mapper,
            } => DensityFunction::weird_scaled_sampler(
                self.build(input)?,
                self.noise(noise)?,
                *rarity_value_mapper,
            ),
            P::ShiftedNoise {
                shift_x,
                shift_y,
                shift_z,
                xz_scale,
                y_scale,
                noise,
            } => DensityFunction::shifted_noise(
                self.build(shift_x)?,
                self.build(shift_y)?,
                self.build(shift_z)?,
                *xz_scale,
                *y_scale,
                self.noise(noise)?,
            ),
            P::RangeChoice {
                input,
                min_inclusive,
                max_exclusive,
                when_in_range,
                when_out_of_range,
            } => DensityFunction::range_choice(
                self.build(input)?,
                *min_inclusive,
                *max_exclusive,
                self.build(when_in_range)?,
                self.build(when_out_of_range)?,
            ),
            P::ShiftA { argument } => Arc::new(DensityFunction::ShiftA(self.noise(argument)?)),
            P::ShiftB { argument } => Arc::new(DensityFunction::ShiftB(self.noise(argument)?)),
            P::Shift { argument } => Arc::new(DensityFunction::Shift(self.noise(argument)?)),
            P::BlendDensity(f) => Arc::new(DensityFunction::BlendDensity(self.build(&f.argument)?)),
            P::Clamp { input, min, max } => DensityFunction::clamp(self.build(input)?, *min, *max),
            P::Abs(f) => DensityFunction::mapped(MappedOp::Abs, self.build(&f.argument)?),
            P::Square(f) => DensityFunction::mapped(MappedOp::Square, self.build(&f.argument)?),
            P::Cube(f) => DensityFunction::mapped(MappedOp::Cube, self.build(&f.argument)?),
            P::HalfNegative(f) => {
                DensityFunction::mapped(MappedOp::HalfNegative, self.build(&f.argument)?)
            }
            P::QuarterNegative(f) => {
                DensityFunction::mapped(MappedOp::QuarterNegative, self.build(&f.argument)?)
            }
            P::Invert(f) => DensityFunction::mapped(MappedOp::Invert, self.build(&f.argument)?),
            P::Squeeze(f) => DensityFunction::mapped(MappedOp::Squeeze, self.build(&f.argument)?),
            P::Add(f) | P::Mul(f) | P::Min(f) | P::Max(f) => {
                let op = match function {
                    P::Add(_) => TwoArgumentOp::Add,
                    P::Mul(_) => TwoArgumentOp::Mul,
                    P::Min(_) => TwoArgumentOp::Min,
                    _ => TwoArgumentOp::Max,
                };
                let argument1 = self.build(&f.argument1)?;
                let argument2 = self.build(&f.argument2)?;
                DensityFunction::two_argument(op, argument1, argument2)
            }
            P::Spline { spline } => match self.spline(spline)? {
                CubicSpline::Constant(value) => DensityFunction::constant(value as f64),
                spline => DensityFunction::spline(spline),
            },
            P::Constant { argument } => DensityFunction::constant(*argument),
            P::YClampedGradient {
                from_y,
                to_y,
                from_value,
                to_value,
            } => DensityFunction::y_clamped_gradient(*from_y, *to_y, *from_value, *to_value),
            P::FindTopSurface {
                density,
                upper_bound,
                lower_bound,
                cell_height,
            } => DensityFunction::find_top_surface(
                self.build(density)?,
                self.build(upper_bound)?,
                *lower_bound,
                *cell_height,
            )?,
        })
    }
}

#[cfg(test)]
mod test {
    use crate::density_function::proto::DensityFunctionHolder;
    use crate::density_function::registry::{DensityFunctionRegistry, GraphBuilder};
    use crate::density_function::{DensityFunction, SinglePointContext};
    use crate::error::WorldgenError;
    use crate::noise::NoiseRegistry;
    use std::sync::Arc;

    fn holder(json: &str) -> DensityFunctionHolder {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn shared_references_build_once() {
        let mut functions = DensityFunctionRegistry::new();
        functions
            .register(
                "overworld/base",
                holder(r#"{ "type": "minecraft:y_clamped_gradient", "from_y": -64, "to_y": 320, "from_value": 1.0, "to_value": -1.0 }"#),
            )
            .unwrap();
        functions
            .register(
                "overworld/doubled",
                holder(r#"{ "type": "minecraft:add", "argument1": "minecraft:overworld/base", "argument2": "overworld/base" }"#),
            )
            .unwrap();
        let noises = NoiseRegistry::vanilla();
        let mut builder = GraphBuilder::new(&functions, &noises);
        let doubled = builder.resolve("overworld/doubled").unwrap();
        let DensityFunction::TwoArgument {
            argument1,
            argument2,
            ..
        } = &*doubled
        else {
            panic!("expected a two argument node, got {doubled:?}");
        };
        assert!(Arc::ptr_eq(argument1, argument2));
        assert_eq!(builder.built_count(), 2);
        assert_eq!(doubled.compute(&SinglePointContext::new(0, 64, 0)), 0.6666666666666667);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut functions = DensityFunctionRegistry::new();
        functions.register("zero", holder("0.0")).unwrap();
        assert!(matches!(
            functions.register("minecraft:zero", holder("1.0")),
            Err(WorldgenError::DuplicateKey(key)) if key == "minecraft:zero"
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut functions = DensityFunctionRegistry::new();
        functions
            .register("a", holder(r#"{ "type": "minecraft:abs", "argument": "minecraft:b" }"#))
            .unwrap();
        functions
            .register("b", holder(r#"{ "type": "minecraft:square", "argument": "minecraft:a" }"#))
            .unwrap();
        let noises = NoiseRegistry::new();
        let mut builder = GraphBuilder::new(&functions, &noises);
        assert!(matches!(
            builder.resolve("a"),
            Err(WorldgenError::ReferenceCycle(key)) if key == "minecraft:a"
        ));
    }

    #[test]
    fn unknown_references_are_rejected() {
        let functions = DensityFunctionRegistry::new();
        let noises = NoiseRegistry::new();
        let mut builder = GraphBuilder::new(&functions, &noises);
        assert!(matches!(
            builder.build(&holder(r#""minecraft:missing""#)),
            Err(WorldgenError::UnknownDensityFunction(_))
        ));
        assert!(matches!(
            builder.build(&holder(
                r#"{ "type": "minecraft:noise", "noise": "minecraft:ridge", "xz_scale": 1.0, "y_scale": 1.0 }"#
            )),
            Err(WorldgenError::UnknownNoise(key)) if key == "minecraft:ridge"
        ));
        assert!(matches!(
            builder.build(&holder(
                r#"{ "type": "minecraft:noise", "noise": { "firstOctave": 0, "amplitudes": [1.0] }, "xz_scale": 1.0, "y_scale": 1.0 }"#
            )),
            Err(WorldgenError::InlineNoise)
        ));
    }

    #[test]
    fn malformed_splines_are_rejected() {
        let functions = DensityFunctionRegistry::new();
        let noises = NoiseRegistry::new();
        let mut builder = GraphBuilder::new(&functions, &noises);
        let spline = holder(
            r#"{ "type": "minecraft:spline", "spline": { "coordinate": 0.0, "points": [
                { "location": 0.5, "value": 1.0, "derivative": 0.0 },
                { "location": 0.1, "value": 2.0, "derivative": 0.0 } ] } }"#,
        );
        assert!(matches!(builder.build(&spline), Err(WorldgenError::Spline(_))));
        let empty = holder(r#"{ "type": "minecraft:spline", "spline": { "coordinate": 0.0, "points": [] } }"#);
        assert!(matches!(builder.build(&empty), Err(WorldgenError::Spline(_))));
    }

    #[test]
    fn constant_splines_become_constants() {
        let functions = DensityFunctionRegistry::new();
        let noises = NoiseRegistry::new();
        let mut builder = GraphBuilder::new(&functions, &noises);
        let function = builder
            .build(&holder(r#"{ "type": "minecraft:spline", "spline": 0.25 }"#))
            .unwrap();
        assert!(matches!(*function, DensityFunction::Constant(v) if v == 0.25));
    }
}
