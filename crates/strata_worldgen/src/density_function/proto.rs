use crate::density_function::RarityValueMapper;
use crate::noise::NoiseParam;
use crate::resource_key;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A density function as it appears in settings: a literal, a registry key, or an inline node.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DensityFunctionHolder {
    Value(f64),
    Reference(String),
    Owned(Box<ProtoDensityFunction>),
}

impl From<f64> for DensityFunctionHolder {
    fn from(value: f64) -> Self {
        DensityFunctionHolder::Value(value)
    }
}

impl From<ProtoDensityFunction> for DensityFunctionHolder {
    fn from(function: ProtoDensityFunction) -> Self {
        DensityFunctionHolder::Owned(Box::new(function))
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtoDensityFunction {
    #[serde(rename = "minecraft:blend_alpha", alias = "blend_alpha")]
    BlendAlpha,
    #[serde(rename = "minecraft:blend_offset", alias = "blend_offset")]
    BlendOffset,
    #[serde(rename = "minecraft:beardifier", alias = "beardifier")]
    Beardifier,
    #[serde(rename = "minecraft:old_blended_noise", alias = "old_blended_noise")]
    OldBlendedNoise {
        xz_scale: f64,
        y_scale: f64,
        xz_factor: f64,
        y_factor: f64,
        smear_scale_multiplier: f64,
    },
    #[serde(rename = "minecraft:interpolated", alias = "interpolated")]
    Interpolated(SingleArgumentFunction),
    #[serde(rename = "minecraft:flat_cache", alias = "flat_cache")]
    FlatCache(SingleArgumentFunction),
    #[serde(rename = "minecraft:cache_2d", alias = "cache_2d")]
    Cache2d(SingleArgumentFunction),
    #[serde(rename = "minecraft:cache_once", alias = "cache_once")]
    CacheOnce(SingleArgumentFunction),
    #[serde(rename = "minecraft:cache_all_in_cell", alias = "cache_all_in_cell")]
    CacheAllInCell(SingleArgumentFunction),
    #[serde(rename = "minecraft:noise", alias = "noise")]
    Noise {
        noise: ProtoNoiseHolder,
        xz_scale: f64,
        y_scale: f64,
    },
    #[serde(rename = "minecraft:end_islands", alias = "end_islands")]
    EndIslands,
    #[serde(rename = "minecraft:weird_scaled_sampler", alias = "weird_scaled_sampler")]
    WeirdScaledSampler {
        input: DensityFunctionHolder,
        noise: ProtoNoiseHolder,
        rarity_value_mapper: RarityValueMapper,
    },
    #[serde(rename = "minecraft:shifted_noise", alias = "shifted_noise")]
    ShiftedNoise {
        shift_x: DensityFunctionHolder,
        shift_y: DensityFunctionHolder,
        shift_z: DensityFunctionHolder,
        xz_scale: f64,
        y_scale: f64,
        noise: ProtoNoiseHolder,
    },
    #[serde(rename = "minecraft:range_choice", alias = "range_choice")]
    RangeChoice {
        input: DensityFunctionHolder,
        min_inclusive: f64,
        max_exclusive: f64,
        when_in_range: DensityFunctionHolder,
        when_out_of_range: DensityFunctionHolder,
    },
    #[serde(rename = "minecraft:shift_a", alias = "shift_a")]
    ShiftA { argument: ProtoNoiseHolder },
    #[serde(rename = "minecraft:shift_b", alias = "shift_b")]
    ShiftB { argument: ProtoNoiseHolder },
    #[serde(rename = "minecraft:shift", alias = "shift")]
    Shift { argument: ProtoNoiseHolder },
    #[serde(rename = "minecraft:blend_density", alias = "blend_density")]
    BlendDensity(SingleArgumentFunction),
    #[serde(rename = "minecraft:clamp", alias = "clamp")]
    Clamp {
        input: DensityFunctionHolder,
        min: f64,
        max: f64,
    },
    #[serde(rename = "minecraft:abs", alias = "abs")]
    Abs(SingleArgumentFunction),
    #[serde(rename = "minecraft:square", alias = "square")]
    Square(SingleArgumentFunction),
    #[serde(rename = "minecraft:cube", alias = "cube")]
    Cube(SingleArgumentFunction),
    #[serde(rename = "minecraft:half_negative", alias = "half_negative")]
    HalfNegative(SingleArgumentFunction),
    #[serde(rename = "minecraft:quarter_negative", alias = "quarter_negative")]
    QuarterNegative(SingleArgumentFunction),
    #[serde(rename = "minecraft:invert", alias = "invert")]
    Invert(SingleArgumentFunction),
    #[serde(rename = "minecraft:squeeze", alias = "squeeze")]
    Squeeze(SingleArgumentFunction),
    #[serde(rename = "minecraft:add", alias = "add")]
    Add(TwoArgumentFunction),
    #[serde(rename = "minecraft:mul", alias = "mul")]
    Mul(TwoArgumentFunction),
    #[serde(rename = "minecraft:min", alias = "min")]
    Min(TwoArgumentFunction),
    #[serde(rename = "minecraft:max", alias = "max")]
    Max(TwoArgumentFunction),
    #[serde(rename = "minecraft:spline", alias = "spline")]
    Spline { spline: SplineHolder },
    #[serde(rename = "minecraft:constant", alias = "constant")]
    Constant { argument: f64 },
    #[serde(rename = "minecraft:y_clamped_gradient", alias = "y_clamped_gradient")]
    YClampedGradient {
        from_y: i32,
        to_y: i32,
        from_value: f64,
        to_value: f64,
    },
    #[serde(rename = "minecraft:find_top_surface", alias = "find_top_surface")]
    FindTopSurface {
        density: DensityFunctionHolder,
        upper_bound: DensityFunctionHolder,
        lower_bound: i32,
        cell_height: i32,
    },
}

/// A noise by registry key, or inline parameters.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtoNoiseHolder {
    Reference(String),
    Owned(NoiseParam),
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SingleArgumentFunction {
    pub argument: DensityFunctionHolder,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TwoArgumentFunction {
    pub argument1: DensityFunctionHolder,
    pub argument2: DensityFunctionHolder,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplineHolder {
    Constant(f32),
    Spline(Spline),
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Spline {
    pub coordinate: DensityFunctionHolder,
    pub points: Vec<SplinePoint>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SplinePoint {
    pub location: f32,
    pub value: SplineHolder,
    pub derivative: f32,
}

/// Read-only walk over proto graphs. Each `visit_*` default recurses into the children.
pub trait Visitor {
    fn visit_holder(&mut self, holder: &DensityFunctionHolder) {
        match holder {
            DensityFunctionHolder::Value(_) => {}
            DensityFunctionHolder::Reference(key) => self.visit_reference(key),
            DensityFunctionHolder::Owned(function) => self.visit_function(function),
        }
    }

    fn visit_reference(&mut self, _key: &str) {}

    fn visit_noise(&mut self, _noise: &ProtoNoiseHolder) {}

    fn visit_function(&mut self, function: &ProtoDensityFunction) {
        walk_function(self, function)
    }

    fn visit_spline(&mut self, spline: &SplineHolder) {
        if let SplineHolder::Spline(spline) = spline {
            self.visit_holder(&spline.coordinate);
            for point in &spline.points {
                self.visit_spline(&point.value);
            }
        }
    }
}

pub fn walk_function<V: Visitor + ?Sized>(visitor: &mut V, function: &ProtoDensityFunction) {
    use ProtoDensityFunction as P;
    match function {
        P::BlendAlpha
        | P::BlendOffset
        | P::Beardifier
        | P::OldBlendedNoise { .. }
        | P::EndIslands
        | P::Constant { .. }
        | P::YClampedGradient { .. } => {}
        P::Interpolated(f)
        | P::FlatCache(f)
        | P::Cache2d(f)
        | P::CacheOnce(f)
        | P::CacheAllInCell(f)
        | P::BlendDensity(f)
        | P::Abs(f)
        | P::Square(f)
        | P::Cube(f)
        | P::HalfNegative(f)
        | P::QuarterNegative(f)
        | P::Invert(f)
        | P::Squeeze(f) => visitor.visit_holder(&f.argument),
        P::Add(f) | P::Mul(f) | P::Min(f) | P::Max(f) => {
            visitor.visit_holder(&f.argument1);
            visitor.visit_holder(&f.argument2);
        }
        P::Noise { noise, .. } => visitor.visit_noise(noise),
        P::ShiftA { argument } | P::ShiftB { argument } | P::Shift { argument } => {
            visitor.visit_noise(argument)
        }
        P::WeirdScaledSampler { input, noise, .. } => {
            visitor.visit_holder(input);
            visitor.visit_noise(noise);
        }
        P::ShiftedNoise {
            shift_x,
            shift_y,
            shift_z,
            noise,
            ..
        } => {
            visitor.visit_holder(shift_x);
            visitor.visit_holder(shift_y);
            visitor.visit_holder(shift_z);
            visitor.visit_noise(noise);
        }
        P::RangeChoice {
            input,
            when_in_range,
            when_out_of_range,
            ..
        } => {
            visitor.visit_holder(input);
            visitor.visit_holder(when_in_range);
            visitor.visit_holder(when_out_of_range);
        }
        P::Clamp { input, .. } => visitor.visit_holder(input),
        P::Spline { spline } => visitor.visit_spline(spline),
        P::FindTopSurface {
            density,
            upper_bound,
            ..
        } => {
            visitor.visit_holder(density);
            visitor.visit_holder(upper_bound);
        }
    }
}

/// Collects the density function and noise keys a proto graph refers to, namespaced and in
/// first-seen order.
#[derive(Debug, Default)]
pub struct References {
    pub density_functions: IndexSet<String>,
    pub noises: IndexSet<String>,
}

impl Visitor for References {
    fn visit_reference(&mut self, key: &str) {
        self.density_functions.insert(resource_key(key));
    }

    fn visit_noise(&mut self, noise: &ProtoNoiseHolder) {
        if let ProtoNoiseHolder::Reference(key) = noise {
            self.noises.insert(resource_key(key));
        }
    }
}
