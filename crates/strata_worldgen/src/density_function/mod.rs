pub mod end_islands;
pub mod proto;
pub mod registry;

use crate::density_function::end_islands::EndIslands;
use crate::error::WorldgenError;
use crate::math::{clamp, clamped_map, max_nan, min_nan};
use crate::noise::blended_noise::BlendedNoise;
use crate::noise::normal_noise::NormalNoise;
use crate::noise_chunk::NoiseChunk;
use crate::spline::{CubicSpline, RangeFunction, SplineFunction};
use bevy_math::IVec3;
use rustc_hash::FxHashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::warn;

pub type DensityFunctionRef = Arc<DensityFunction>;

/// A block position being evaluated, plus the chunk whose caches the markers should use.
pub trait FunctionContext {
    fn block_x(&self) -> i32;

    fn block_y(&self) -> i32;

    fn block_z(&self) -> i32;

    fn pos(&self) -> IVec3 {
        IVec3::new(self.block_x(), self.block_y(), self.block_z())
    }

    /// Markers only cache when a chunk is present, otherwise they pass straight through.
    fn noise_chunk(&self) -> Option<&NoiseChunk> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinglePointContext {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SinglePointContext {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl FunctionContext for SinglePointContext {
    fn block_x(&self) -> i32 {
        self.x
    }

    fn block_y(&self) -> i32 {
        self.y
    }

    fn block_z(&self) -> i32 {
        self.z
    }
}

impl From<IVec3> for SinglePointContext {
    fn from(pos: IVec3) -> Self {
        Self::new(pos.x, pos.y, pos.z)
    }
}

/// A noise reference by key. Unwired holders sample as zero until a random state binds them.
#[derive(Clone)]
pub struct NoiseHolder {
    key: String,
    noise: Option<Arc<NormalNoise>>,
}

impl NoiseHolder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            noise: None,
        }
    }

    pub fn wired(key: impl Into<String>, noise: Arc<NormalNoise>) -> Self {
        Self {
            key: key.into(),
            noise: Some(noise),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn noise(&self) -> Option<&Arc<NormalNoise>> {
        self.noise.as_ref()
    }

    #[inline]
    pub fn get_value(&self, x: f64, y: f64, z: f64) -> f64 {
        match &self.noise {
            Some(noise) => noise.get_value(x, y, z),
            None => 0.0,
        }
    }

    pub fn max_value(&self) -> f64 {
        match &self.noise {
            Some(noise) => noise.max_value(),
            None => 2.0,
        }
    }
}

impl Debug for NoiseHolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseHolder")
            .field("key", &self.key)
            .field("wired", &self.noise.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Interpolated,
    FlatCache,
    Cache2D,
    CacheOnce,
    CacheAllInCell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoArgumentOp {
    Add,
    Mul,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOrAddOp {
    Mul,
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedOp {
    Abs,
    Square,
    Cube,
    HalfNegative,
    QuarterNegative,
    Invert,
    Squeeze,
}

impl MappedOp {
    #[inline]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            MappedOp::Abs => value.abs(),
            MappedOp::Square => value * value,
            MappedOp::Cube => value * value * value,
            MappedOp::HalfNegative => {
                if value > 0.0 {
                    value
                } else {
                    value * 0.5
                }
            }
            MappedOp::QuarterNegative => {
                if value > 0.0 {
                    value
                } else {
                    value * 0.25
                }
            }
            MappedOp::Invert => 1.0 / value,
            MappedOp::Squeeze => {
                let c = clamp(value, -1.0, 1.0);
                c / 2.0 - c * c * c / 24.0
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RarityValueMapper {
    #[serde(rename = "type_1")]
    Type1,
    #[serde(rename = "type_2")]
    Type2,
}

impl RarityValueMapper {
    /// Tunnel rarity for 3D caves.
    pub fn rarity(self, value: f64) -> f64 {
        match self {
            RarityValueMapper::Type1 => {
                if value < -0.5 {
                    0.75
                } else if value < 0.0 {
                    1.0
                } else if value < 0.5 {
                    1.5
                } else {
                    2.0
                }
            }
            RarityValueMapper::Type2 => {
                if value < -0.75 {
                    0.5
                } else if value < -0.5 {
                    0.75
                } else if value < 0.5 {
                    1.0
                } else if value < 0.75 {
                    2.0
                } else {
                    3.0
                }
            }
        }
    }

    pub fn max_rarity(self) -> f64 {
        match self {
            RarityValueMapper::Type1 => 2.0,
            RarityValueMapper::Type2 => 3.0,
        }
    }
}

/// Spline coordinates are density functions, narrowed to `f32` at the boundary.
#[derive(Debug, Clone)]
pub struct SplineCoordinate(pub DensityFunctionRef);

impl RangeFunction for SplineCoordinate {
    fn min_value(&self) -> f32 {
        self.0.min_value() as f32
    }

    fn max_value(&self) -> f32 {
        self.0.max_value() as f32
    }
}

impl<'c> SplineFunction<dyn FunctionContext + 'c> for SplineCoordinate {
    #[inline]
    fn apply(&self, ctx: &(dyn FunctionContext + 'c)) -> f32 {
        self.0.compute(ctx) as f32
    }
}

pub type DensitySpline = CubicSpline<SplineCoordinate>;

/// One node of the terrain graph. Nodes are immutable and shared through [`DensityFunctionRef`];
/// bounds are computed once by the constructors below.
#[derive(Debug, Clone)]
pub enum DensityFunction {
    Constant(f64),
    YClampedGradient {
        from_y: i32,
        to_y: i32,
        from_value: f64,
        to_value: f64,
    },
    Noise {
        noise: NoiseHolder,
        xz_scale: f64,
        y_scale: f64,
    },
    ShiftA(NoiseHolder),
    ShiftB(NoiseHolder),
    Shift(NoiseHolder),
    ShiftedNoise {
        shift_x: DensityFunctionRef,
        shift_y: DensityFunctionRef,
        shift_z: DensityFunctionRef,
        xz_scale: f64,
        y_scale: f64,
        noise: NoiseHolder,
    },
    TwoArgument {
        op: TwoArgumentOp,
        argument1: DensityFunctionRef,
        argument2: DensityFunctionRef,
        min_value: f64,
        max_value: f64,
    },
    MulOrAdd {
        op: MulOrAddOp,
        input: DensityFunctionRef,
        argument: f64,
        min_value: f64,
        max_value: f64,
    },
    Mapped {
        op: MappedOp,
        input: DensityFunctionRef,
        min_value: f64,
        max_value: f64,
    },
    Clamp {
        input: DensityFunctionRef,
        min: f64,
        max: f64,
    },
    RangeChoice {
        input: DensityFunctionRef,
        min_inclusive: f64,
        max_exclusive: f64,
        when_in_range: DensityFunctionRef,
        when_out_of_range: DensityFunctionRef,
    },
    Spline(Box<DensitySpline>),
    Marker {
        kind: MarkerKind,
        wrapped: DensityFunctionRef,
    },
    BlendAlpha,
    BlendOffset,
    BlendDensity(DensityFunctionRef),
    Beardifier,
    OldBlendedNoise(Box<BlendedNoise>),
    EndIslands(Box<EndIslands>),
    WeirdScaledSampler {
        input: DensityFunctionRef,
        noise: NoiseHolder,
        rarity_value_mapper: RarityValueMapper,
    },
    FindTopSurface {
        density: DensityFunctionRef,
        upper_bound: DensityFunctionRef,
        lower_bound: i32,
        cell_height: i32,
    },
}

impl DensityFunction {
    pub fn constant(value: f64) -> DensityFunctionRef {
        Arc::new(DensityFunction::Constant(value))
    }

    pub fn zero() -> DensityFunctionRef {
        Self::constant(0.0)
    }

    pub fn y_clamped_gradient(
        from_y: i32,
        to_y: i32,
        from_value: f64,
        to_value: f64,
    ) -> DensityFunctionRef {
        Arc::new(DensityFunction::YClampedGradient {
            from_y,
            to_y,
            from_value,
            to_value,
        })
    }

    pub fn noise(noise: NoiseHolder, xz_scale: f64, y_scale: f64) -> DensityFunctionRef {
        Arc::new(DensityFunction::Noise {
            noise,
            xz_scale,
            y_scale,
        })
    }

    pub fn shifted_noise(
        shift_x: DensityFunctionRef,
        shift_y: DensityFunctionRef,
        shift_z: DensityFunctionRef,
        xz_scale: f64,
        y_scale: f64,
        noise: NoiseHolder,
    ) -> DensityFunctionRef {
        Arc::new(DensityFunction::ShiftedNoise {
            shift_x,
            shift_y,
            shift_z,
            xz_scale,
            y_scale,
            noise,
        })
    }

    pub fn add(a: DensityFunctionRef, b: DensityFunctionRef) -> DensityFunctionRef {
        Self::two_argument(TwoArgumentOp::Add, a, b)
    }

    pub fn mul(a: DensityFunctionRef, b: DensityFunctionRef) -> DensityFunctionRef {
        Self::two_argument(TwoArgumentOp::Mul, a, b)
    }

    pub fn min(a: DensityFunctionRef, b: DensityFunctionRef) -> DensityFunctionRef {
        Self::two_argument(TwoArgumentOp::Min, a, b)
    }

    pub fn max(a: DensityFunctionRef, b: DensityFunctionRef) -> DensityFunctionRef {
        Self::two_argument(TwoArgumentOp::Max, a, b)
    }

    /// Builds a binary node; a constant operand of add/mul folds into [`DensityFunction::MulOrAdd`].
    pub fn two_argument(
        op: TwoArgumentOp,
        argument1: DensityFunctionRef,
        argument2: DensityFunctionRef,
    ) -> DensityFunctionRef {
        let (min1, max1) = (argument1.min_value(), argument1.max_value());
        let (min2, max2) = (argument2.min_value(), argument2.max_value());
        if matches!(op, TwoArgumentOp::Min | TwoArgumentOp::Max) && (min1 >= max2 || min2 >= max1) {
            warn!(
                ?op,
                first = ?(min1, max1),
                second = ?(min2, max2),
                "creating a min/max function between two non-overlapping inputs"
            );
        }
        let fold = match op {
            TwoArgumentOp::Add => Some(MulOrAddOp::Add),
            TwoArgumentOp::Mul => Some(MulOrAddOp::Mul),
            _ => None,
        };
        if let Some(fold) = fold {
            if let DensityFunction::Constant(value) = *argument1 {
                return Self::mul_or_add(fold, argument2, value);
            }
            if let DensityFunction::Constant(value) = *argument2 {
                return Self::mul_or_add(fold, argument1, value);
            }
        }
        let (min_value, max_value) = match op {
            TwoArgumentOp::Add => (min1 + min2, max1 + max2),
            TwoArgumentOp::Min => (min1.min(min2), max1.min(max2)),
            TwoArgumentOp::Max => (min1.max(min2), max1.max(max2)),
            TwoArgumentOp::Mul => {
                let corners = [min1 * min2, min1 * max2, max1 * min2, max1 * max2];
                corners
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                        (lo.min(*c), hi.max(*c))
                    })
            }
        };
        Arc::new(DensityFunction::TwoArgument {
            op,
            argument1,
            argument2,
            min_value,
            max_value,
        })
    }

    pub fn mul_or_add(op: MulOrAddOp, input: DensityFunctionRef, argument: f64) -> DensityFunctionRef {
        let (min, max) = (input.min_value(), input.max_value());
        let (min_value, max_value) = match op {
            MulOrAddOp::Add => (min + argument, max + argument),
            MulOrAddOp::Mul if argument >= 0.0 => (min * argument, max * argument),
            MulOrAddOp::Mul => (max * argument, min * argument),
        };
        Arc::new(DensityFunction::MulOrAdd {
            op,
            input,
            argument,
            min_value,
            max_value,
        })
    }

    pub fn mapped(op: MappedOp, input: DensityFunctionRef) -> DensityFunctionRef {
        let (min, max) = (input.min_value(), input.max_value());
        let (min_value, max_value) = match op {
            MappedOp::Abs | MappedOp::Square => {
                let a = op.apply(min);
                let b = op.apply(max);
                (min.max(0.0), a.max(b))
            }
            MappedOp::Invert if min <= 0.0 && max >= 0.0 => (f64::NEG_INFINITY, f64::INFINITY),
            MappedOp::Invert => (1.0 / max, 1.0 / min),
            _ => (op.apply(min), op.apply(max)),
        };
        Arc::new(DensityFunction::Mapped {
            op,
            input,
            min_value,
            max_value,
        })
    }

    pub fn clamp(input: DensityFunctionRef, min: f64, max: f64) -> DensityFunctionRef {
        Arc::new(DensityFunction::Clamp { input, min, max })
    }

    pub fn range_choice(
        input: DensityFunctionRef,
        min_inclusive: f64,
        max_exclusive: f64,
        when_in_range: DensityFunctionRef,
        when_out_of_range: DensityFunctionRef,
    ) -> DensityFunctionRef {
        Arc::new(DensityFunction::RangeChoice {
            input,
            min_inclusive,
            max_exclusive,
            when_in_range,
            when_out_of_range,
        })
    }

    pub fn spline(spline: DensitySpline) -> DensityFunctionRef {
        Arc::new(DensityFunction::Spline(Box::new(spline)))
    }

    pub fn marker(kind: MarkerKind, wrapped: DensityFunctionRef) -> DensityFunctionRef {
        Arc::new(DensityFunction::Marker { kind, wrapped })
    }

    pub fn interpolated(wrapped: DensityFunctionRef) -> DensityFunctionRef {
        Self::marker(MarkerKind::Interpolated, wrapped)
    }

    pub fn flat_cache(wrapped: DensityFunctionRef) -> DensityFunctionRef {
        Self::marker(MarkerKind::FlatCache, wrapped)
    }

    pub fn cache_2d(wrapped: DensityFunctionRef) -> DensityFunctionRef {
        Self::marker(MarkerKind::Cache2D, wrapped)
    }

    pub fn cache_once(wrapped: DensityFunctionRef) -> DensityFunctionRef {
        Self::marker(MarkerKind::CacheOnce, wrapped)
    }

    pub fn cache_all_in_cell(wrapped: DensityFunctionRef) -> DensityFunctionRef {
        Self::marker(MarkerKind::CacheAllInCell, wrapped)
    }

    pub fn weird_scaled_sampler(
        input: DensityFunctionRef,
        noise: NoiseHolder,
        rarity_value_mapper: RarityValueMapper,
    ) -> DensityFunctionRef {
        Arc::new(DensityFunction::WeirdScaledSampler {
            input,
            noise,
            rarity_value_mapper,
        })
    }

    pub fn find_top_surface(
        density: DensityFunctionRef,
        upper_bound: DensityFunctionRef,
        lower_bound: i32,
        cell_height: i32,
    ) -> Result<DensityFunctionRef, WorldgenError> {
        if cell_height <= 0 {
            return Err(WorldgenError::InvalidDensityFunction(format!(
                "find_top_surface cell height must be positive, got {cell_height}"
            )));
        }
        Ok(Arc::new(DensityFunction::FindTopSurface {
            density,
            upper_bound,
            lower_bound,
            cell_height,
        }))
    }

    pub fn compute(&self, ctx: &dyn FunctionContext) -> f64 {
        match self {
            DensityFunction::Constant(value) => *value,
            DensityFunction::YClampedGradient {
                from_y,
                to_y,
                from_value,
                to_value,
            } => clamped_map(
                ctx.block_y() as f64,
                *from_y as f64,
                *to_y as f64,
                *from_value,
                *to_value,
            ),
            DensityFunction::Noise {
                noise,
                xz_scale,
                y_scale,
            } => noise.get_value(
                ctx.block_x() as f64 * xz_scale,
                ctx.block_y() as f64 * y_scale,
                ctx.block_z() as f64 * xz_scale,
            ),
            DensityFunction::ShiftA(noise) => {
                noise.get_value(ctx.block_x() as f64 * 0.25, 0.0, ctx.block_z() as f64 * 0.25) * 4.0
            }
            DensityFunction::ShiftB(noise) => {
                noise.get_value(ctx.block_z() as f64 * 0.25, ctx.block_x() as f64 * 0.25, 0.0) * 4.0
            }
            DensityFunction::Shift(noise) => {
                noise.get_value(
                    ctx.block_x() as f64 * 0.25,
                    ctx.block_y() as f64 * 0.25,
                    ctx.block_z() as f64 * 0.25,
                ) * 4.0
            }
            DensityFunction::ShiftedNoise {
                shift_x,
                shift_y,
                shift_z,
                xz_scale,
                y_scale,
                noise,
            } => {
                let x = ctx.block_x() as f64 * xz_scale + shift_x.compute(ctx);
                let y = ctx.block_y() as f64 * y_scale + shift_y.compute(ctx);
                let z = ctx.block_z() as f64 * xz_scale + shift_z.compute(ctx);
                noise.get_value(x, y, z)
            }
            DensityFunction::TwoArgument {
                op,
                argument1,
                argument2,
                ..
            } => {
                let first = argument1.compute(ctx);
                match op {
                    TwoArgumentOp::Add => first + argument2.compute(ctx),
                    TwoArgumentOp::Mul => {
                        if first == 0.0 {
                            0.0
                        } else {
                            first * argument2.compute(ctx)
                        }
                    }
                    TwoArgumentOp::Min => {
                        if first < argument2.min_value() {
                            first
                        } else {
                            min_nan(first, argument2.compute(ctx))
                        }
                    }
                    TwoArgumentOp::Max => {
                        if first > argument2.max_value() {
                            first
                        } else {
                            max_nan(first, argument2.compute(ctx))
                        }
                    }
                }
            }
            DensityFunction::MulOrAdd {
                op,
                input,
                argument,
                ..
            } => {
                let value = input.compute(ctx);
                match op {
                    MulOrAddOp::Mul => value * argument,
                    MulOrAddOp::Add => value + argument,
                }
            }
            DensityFunction::Mapped { op, input, .. } => op.apply(input.compute(ctx)),
            DensityFunction::Clamp { input, min, max } => clamp(input.compute(ctx), *min, *max),
            DensityFunction::RangeChoice {
                input,
                min_inclusive,
                max_exclusive,
                when_in_range,
                when_out_of_range,
            } => {
                let value = input.compute(ctx);
                if value >= *min_inclusive && value < *max_exclusive {
                    when_in_range.compute(ctx)
                } else {
                    when_out_of_range.compute(ctx)
                }
            }
            DensityFunction::Spline(spline) => spline.apply(ctx) as f64,
            DensityFunction::Marker { kind, wrapped } => match ctx.noise_chunk() {
                Some(chunk) => chunk.compute_marker(*kind, wrapped, ctx),
                None => wrapped.compute(ctx),
            },
            DensityFunction::BlendAlpha => 1.0,
            DensityFunction::BlendOffset | DensityFunction::Beardifier => 0.0,
            DensityFunction::BlendDensity(input) => input.compute(ctx),
            DensityFunction::OldBlendedNoise(noise) => {
                noise.compute(ctx.block_x(), ctx.block_y(), ctx.block_z())
            }
            DensityFunction::EndIslands(islands) => islands.compute(ctx.block_x(), ctx.block_z()),
            DensityFunction::WeirdScaledSampler {
                input,
                noise,
                rarity_value_mapper,
            } => {
                let rarity = rarity_value_mapper.rarity(input.compute(ctx));
                rarity
                    * noise
                        .get_value(
                            ctx.block_x() as f64 / rarity,
                            ctx.block_y() as f64 / rarity,
                            ctx.block_z() as f64 / rarity,
                        )
                        .abs()
            }
            DensityFunction::FindTopSurface {
                density,
                upper_bound,
                lower_bound,
                cell_height,
            } => {
                // upper bounds outside i32 saturate
                let top = ((upper_bound.compute(ctx) / *cell_height as f64).floor() as i32)
                    .saturating_mul(*cell_height);
                if top <= *lower_bound {
                    return *lower_bound as f64;
                }
                let mut y = top;
                while y >= *lower_bound {
                    let column = SinglePointContext::new(ctx.block_x(), y, ctx.block_z());
                    if density.compute(&column) > 0.0 {
                        return y as f64;
                    }
                    let Some(next) = y.checked_sub(*cell_height) else {
                        break;
                    };
                    y = next;
                }
                *lower_bound as f64
            }
        }
    }

    pub fn min_value(&self) -> f64 {
        match self {
            DensityFunction::Constant(value) => *value,
            DensityFunction::YClampedGradient {
                from_value,
                to_value,
                ..
            } => from_value.min(*to_value),
            DensityFunction::Noise { noise, .. }
            | DensityFunction::ShiftedNoise { noise, .. } => -noise.max_value(),
            DensityFunction::ShiftA(noise)
            | DensityFunction::ShiftB(noise)
            | DensityFunction::Shift(noise) => -noise.max_value() * 4.0,
            DensityFunction::TwoArgument { min_value, .. }
            | DensityFunction::MulOrAdd { min_value, .. }
            | DensityFunction::Mapped { min_value, .. } => *min_value,
            DensityFunction::Clamp { min, .. } => *min,
            DensityFunction::RangeChoice {
                when_in_range,
                when_out_of_range,
                ..
            } => when_in_range.min_value().min(when_out_of_range.min_value()),
            DensityFunction::Spline(spline) => spline.min_value() as f64,
            DensityFunction::Marker { wrapped, .. } => wrapped.min_value(),
            DensityFunction::BlendAlpha => 1.0,
            DensityFunction::BlendOffset | DensityFunction::Beardifier => 0.0,
            DensityFunction::BlendDensity(_) => f64::NEG_INFINITY,
            DensityFunction::OldBlendedNoise(noise) => noise.min_value(),
            DensityFunction::EndIslands(_) => EndIslands::MIN_VALUE,
            DensityFunction::WeirdScaledSampler { .. } => 0.0,
            DensityFunction::FindTopSurface { lower_bound, .. } => *lower_bound as f64,
        }
    }

    pub fn max_value(&self) -> f64 {
        match self {
            DensityFunction::Constant(value) => *value,
            DensityFunction::YClampedGradient {
                from_value,
                to_value,
                ..
            } => from_value.max(*to_value),
            DensityFunction::Noise { noise, .. }
            | DensityFunction::ShiftedNoise { noise, .. } => noise.max_value(),
            DensityFunction::ShiftA(noise)
            | DensityFunction::ShiftB(noise)
            | DensityFunction::Shift(noise) => noise.max_value() * 4.0,
            DensityFunction::TwoArgument { max_value, .. }
            | DensityFunction::MulOrAdd { max_value, .. }
            | DensityFunction::Mapped { max_value, .. } => *max_value,
            DensityFunction::Clamp { max, .. } => *max,
            DensityFunction::RangeChoice {
                when_in_range,
                when_out_of_range,
                ..
            } => when_in_range.max_value().max(when_out_of_range.max_value()),
            DensityFunction::Spline(spline) => spline.max_value() as f64,
            DensityFunction::Marker { wrapped, .. } => wrapped.max_value(),
            DensityFunction::BlendAlpha => 1.0,
            DensityFunction::BlendOffset | DensityFunction::Beardifier => 0.0,
            DensityFunction::BlendDensity(_) => f64::INFINITY,
            DensityFunction::OldBlendedNoise(noise) => noise.max_value(),
            DensityFunction::EndIslands(_) => EndIslands::MAX_VALUE,
            DensityFunction::WeirdScaledSampler {
                noise,
                rarity_value_mapper,
                ..
            } => rarity_value_mapper.max_rarity() * noise.max_value(),
            DensityFunction::FindTopSurface {
                upper_bound,
                lower_bound,
                ..
            } => (*lower_bound as f64).max(upper_bound.max_value()),
        }
    }

    /// Direct children, in declaration order.
    pub fn children(&self) -> Vec<&DensityFunctionRef> {
        match self {
            DensityFunction::ShiftedNoise {
                shift_x,
                shift_y,
                shift_z,
                ..
            } => vec![shift_x, shift_y, shift_z],
            DensityFunction::TwoArgument {
                argument1,
                argument2,
                ..
            } => vec![argument1, argument2],
            DensityFunction::MulOrAdd { input, .. }
            | DensityFunction::Mapped { input, .. }
            | DensityFunction::Clamp { input, .. }
            | DensityFunction::BlendDensity(input)
            | DensityFunction::WeirdScaledSampler { input, .. } => vec![input],
            DensityFunction::RangeChoice {
                input,
                when_in_range,
                when_out_of_range,
                ..
            } => vec![input, when_in_range, when_out_of_range],
            DensityFunction::Marker { wrapped, .. } => vec![wrapped],
            DensityFunction::FindTopSurface {
                density,
                upper_bound,
                ..
            } => vec![density, upper_bound],
            DensityFunction::Spline(spline) => {
                let mut coordinates = Vec::new();
                collect_spline_coordinates(spline, &mut coordinates);
                coordinates
            }
            _ => Vec::new(),
        }
    }

    /// Rewrites the graph rooted at `function` with `visitor`, see [`GraphMapper`].
    pub fn map_all<V: Visitor>(
        function: &DensityFunctionRef,
        visitor: V,
    ) -> Result<DensityFunctionRef, WorldgenError> {
        GraphMapper::new(visitor).map(function)
    }
}

fn collect_spline_coordinates<'a>(spline: &'a DensitySpline, out: &mut Vec<&'a DensityFunctionRef>) {
    if let CubicSpline::MultiPoint {
        coordinate, values, ..
    } = spline
    {
        out.push(&coordinate.0);
        for value in values {
            collect_spline_coordinates(value, out);
        }
    }
}

/// A graph rewrite. `apply` sees every node after its children were rewritten.
pub trait Visitor {
    fn apply(&mut self, function: DensityFunctionRef) -> Result<DensityFunctionRef, WorldgenError>;

    fn visit_noise(&mut self, noise: &NoiseHolder) -> Result<NoiseHolder, WorldgenError> {
        Ok(noise.clone())
    }
}

/// Applies a [`Visitor`] bottom-up over one or more roots. Nodes reachable along several paths
/// are rewritten once and the result is shared, keyed by node identity.
pub struct GraphMapper<V> {
    visitor: V,
    // the source Arc is kept so its address cannot be reused while the memo is alive
    memo: FxHashMap<usize, (DensityFunctionRef, DensityFunctionRef)>,
}

impl<V: Visitor> GraphMapper<V> {
    pub fn new(visitor: V) -> Self {
        Self {
            visitor,
            memo: FxHashMap::default(),
        }
    }

    pub fn visitor(&self) -> &V {
        &self.visitor
    }

    pub fn into_inner(self) -> V {
        self.visitor
    }

    pub fn map(&mut self, function: &DensityFunctionRef) -> Result<DensityFunctionRef, WorldgenError> {
        let key = Arc::as_ptr(function) as usize;
        if let Some((_, mapped)) = self.memo.get(&key) {
            return Ok(mapped.clone());
        }
        let rebuilt = self.rebuild(function)?;
        let mapped = self.visitor.apply(rebuilt)?;
        self.memo.insert(key, (function.clone(), mapped.clone()));
        Ok(mapped)
    }

    fn rebuild(&mut self, function: &DensityFunctionRef) -> Result<DensityFunctionRef, WorldgenError> {
        Ok(match &**function {
            DensityFunction::Noise {
                noise,
                xz_scale,
                y_scale,
            } => DensityFunction::noise(self.visitor.visit_noise(noise)?, *xz_scale, *y_scale),
            DensityFunction::ShiftA(noise) => {
                Arc::new(DensityFunction::ShiftA(self.visitor.visit_noise(noise)?))
            }
            DensityFunction::ShiftB(noise) => {
                Arc::new(DensityFunction::ShiftB(self.visitor.visit_noise(noise)?))
            }
            DensityFunction::Shift(noise) => {
                Arc::new(DensityFunction::Shift(self.visitor.visit_noise(noise)?))
            }
            DensityFunction::ShiftedNoise {
                shift_x,
                shift_y,
                shift_z,
                xz_scale,
                y_scale,
                noise,
            } => DensityFunction::shifted_noise(
                self.map(shift_x)?,
                self.map(shift_y)?,
                self.map(shift_z)?,
                *xz_scale,
                *y_scale,
                self.visitor.visit_noise(noise)?,
            ),
            DensityFunction::TwoArgument {
                op,
                argument1,
                argument2,
                ..
            } => {
                let argument1 = self.map(argument1)?;
                let argument2 = self.map(argument2)?;
                DensityFunction::two_argument(*op, argument1, argument2)
            }
            DensityFunction::MulOrAdd {
                op,
                input,
                argument,
                ..
            } => DensityFunction::mul_or_add(*op, self.map(input)?, *argument),
            DensityFunction::Mapped { op, input, .. } => DensityFunction::mapped(*op, self.map(input)?),
            DensityFunction::Clamp { input, min, max } => {
                DensityFunction::clamp(self.map(input)?, *min, *max)
            }
            DensityFunction::RangeChoice {
                input,
                min_inclusive,
                max_exclusive,
                when_in_range,
                when_out_of_range,
            } => DensityFunction::range_choice(
                self.map(input)?,
                *min_inclusive,
                *max_exclusive,
                self.map(when_in_range)?,
                self.map(when_out_of_range)?,
            ),
            DensityFunction::Spline(spline) => {
                let spline = spline.try_map_all(&mut |coordinate: &SplineCoordinate| {
                    self.map(&coordinate.0).map(SplineCoordinate)
                })?;
                DensityFunction::spline(spline)
            }
            DensityFunction::Marker { kind, wrapped } => {
                DensityFunction::marker(*kind, self.map(wrapped)?)
            }
            DensityFunction::BlendDensity(input) => {
                Arc::new(DensityFunction::BlendDensity(self.map(input)?))
            }
            DensityFunction::WeirdScaledSampler {
                input,
                noise,
                rarity_value_mapper,
            } => DensityFunction::weird_scaled_sampler(
                self.map(input)?,
                self.visitor.visit_noise(noise)?,
                *rarity_value_mapper,
            ),
            DensityFunction::FindTopSurface {
                density,
                upper_bound,
                lower_bound,
                cell_height,
            } => DensityFunction::find_top_surface(
                self.map(density)?,
                self.map(upper_bound)?,
                *lower_bound,
                *cell_height,
            )?,
            DensityFunction::Constant(_)
            | DensityFunction::YClampedGradient { .. }
            | DensityFunction::BlendAlpha
            | DensityFunction::BlendOffset
            | DensityFunction::Beardifier
            | DensityFunction::OldBlendedNoise(_)
            | DensityFunction::EndIslands(_) => function.clone(),
        })
    }
}

/// Strips every cache marker, leaving the plain computation.
pub struct UnwrapMarkers;

impl Visitor for UnwrapMarkers {
    fn apply(&mut self, function: DensityFunctionRef) -> Result<DensityFunctionRef, WorldgenError> {
        match &*function {
            DensityFunction::Marker { wrapped, .. } => Ok(wrapped.clone()),
            _ => Ok(function),
        }
    }
}
