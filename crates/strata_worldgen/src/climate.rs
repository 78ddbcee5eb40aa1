use crate::density_function::{
    DensityFunctionRef, GraphMapper, SinglePointContext, UnwrapMarkers,
};
use crate::error::WorldgenError;
use crate::math::{quart_from_block, quart_to_block};
use crate::proto::Interval;
use crate::router::NoiseRouter;
use bevy_math::IVec3;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Interval<QuantizedCoord>")]
#[serde(into = "Interval<QuantizedCoord>")]
pub struct Param {
    pub min: QuantizedCoord,
    pub max: QuantizedCoord,
}

impl<I: Into<QuantizedCoord>> From<I> for Param {
    fn from(value: I) -> Self {
        let value = value.into();
        Param {
            min: value,
            max: value,
        }
    }
}

impl Param {
    pub fn span<I: Into<QuantizedCoord>>(min: I, max: I) -> Self {
        Param {
            min: min.into(),
            max: max.into(),
        }
    }

    /// Zero inside the span, otherwise the gap to the nearest end.
    #[inline]
    pub fn distance(&self, value: i64) -> i64 {
        let above = value - self.max.0;
        if above > 0 {
            above
        } else {
            (self.min.0 - value).max(0)
        }
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamPoint {
    pub temperature: Param,
    pub humidity: Param,
    pub continentalness: Param,
    pub erosion: Param,
    pub depth: Param,
    pub weirdness: Param,
    pub offset: QuantizedCoord,
}

impl ParamPoint {
    #[inline]
    pub fn new<P, Q>(
        temperature: P,
        humidity: P,
        continentalness: P,
        erosion: P,
        depth: P,
        weirdness: P,
        offset: Q,
    ) -> ParamPoint
    where
        P: Into<Param>,
        Q: Into<QuantizedCoord>,
    {
        ParamPoint {
            temperature: temperature.into(),
            humidity: humidity.into(),
            continentalness: continentalness.into(),
            erosion: erosion.into(),
            depth: depth.into(),
            weirdness: weirdness.into(),
            offset: offset.into(),
        }
    }

    /// Squared distance to `target`; lower is a better match.
    pub fn fitness(&self, target: &TargetPoint) -> i64 {
        let square = |value: i64| value * value;
        square(self.temperature.distance(target.temperature.0))
            + square(self.humidity.distance(target.humidity.0))
            + square(self.continentalness.distance(target.continentalness.0))
            + square(self.erosion.distance(target.erosion.0))
            + square(self.depth.distance(target.depth.0))
            + square(self.weirdness.distance(target.weirdness.0))
            + square(self.offset.0)
    }
}

/// Climate at one position, quantized the way parameter points are.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, Default)]
pub struct TargetPoint {
    pub temperature: QuantizedCoord,
    pub humidity: QuantizedCoord,
    pub continentalness: QuantizedCoord,
    pub erosion: QuantizedCoord,
    pub depth: QuantizedCoord,
    pub weirdness: QuantizedCoord,
}

impl TargetPoint {
    #[inline]
    pub fn new<Q>(
        temperature: Q,
        humidity: Q,
        continentalness: Q,
        erosion: Q,
        depth: Q,
        weirdness: Q,
    ) -> TargetPoint
    where
        Q: Into<QuantizedCoord>,
    {
        TargetPoint {
            temperature: temperature.into(),
            humidity: humidity.into(),
            continentalness: continentalness.into(),
            erosion: erosion.into(),
            depth: depth.into(),
            weirdness: weirdness.into(),
        }
    }
}

impl From<TargetPoint> for [i64; 7] {
    #[inline]
    fn from(value: TargetPoint) -> Self {
        [
            value.temperature.0,
            value.humidity.0,
            value.continentalness.0,
            value.erosion.0,
            value.depth.0,
            value.weirdness.0,
            0,
        ]
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "f32")]
#[serde(into = "f64")]
pub struct QuantizedCoord(pub i64);

impl From<f32> for QuantizedCoord {
    #[inline]
    fn from(value: f32) -> Self {
        QuantizedCoord(QuantizedCoord::quantize_coord(value))
    }
}

impl From<QuantizedCoord> for f64 {
    #[inline]
    fn from(value: QuantizedCoord) -> Self {
        QuantizedCoord::unquantize_coord(value.0)
    }
}

impl From<QuantizedCoord> for i64 {
    #[inline]
    fn from(value: QuantizedCoord) -> Self {
        value.0
    }
}

impl From<i64> for QuantizedCoord {
    #[inline]
    fn from(value: i64) -> Self {
        QuantizedCoord(value)
    }
}

impl QuantizedCoord {
    #[inline]
    pub fn quantize_coord(coord: f32) -> i64 {
        (coord * 10000.0f32) as i64
    }

    #[inline]
    pub fn unquantize_coord(coord: i64) -> f64 {
        coord as f64 / 10000.0
    }
}

impl From<Interval<QuantizedCoord>> for Param {
    #[inline]
    fn from(value: Interval<QuantizedCoord>) -> Self {
        Param {
            min: value.min,
            max: value.max,
        }
    }
}

impl From<Param> for Interval<QuantizedCoord> {
    #[inline]
    fn from(value: Param) -> Self {
        Interval {
            min: value.min,
            max: value.max,
        }
    }
}

/// Evaluates the six climate roots, with cache markers stripped so it can run without a chunk.
#[derive(Debug, Clone)]
pub struct Sampler {
    pub temperature: DensityFunctionRef,
    pub humidity: DensityFunctionRef,
    pub continentalness: DensityFunctionRef,
    pub erosion: DensityFunctionRef,
    pub depth: DensityFunctionRef,
    pub weirdness: DensityFunctionRef,
    pub spawn_target: Vec<ParamPoint>,
}

impl Sampler {
    pub fn new(router: &NoiseRouter, spawn_target: Vec<ParamPoint>) -> Result<Self, WorldgenError> {
        let mut mapper = GraphMapper::new(UnwrapMarkers);
        Ok(Self {
            temperature: mapper.map(&router.temperature)?,
            humidity: mapper.map(&router.vegetation)?,
            continentalness: mapper.map(&router.continents)?,
            erosion: mapper.map(&router.erosion)?,
            depth: mapper.map(&router.depth)?,
            weirdness: mapper.map(&router.ridges)?,
            spawn_target,
        })
    }

    /// Samples at a quart position.
    pub fn sample(&self, quart_x: i32, quart_y: i32, quart_z: i32) -> TargetPoint {
        let ctx = SinglePointContext::new(
            quart_to_block(quart_x),
            quart_to_block(quart_y),
            quart_to_block(quart_z),
        );
        TargetPoint::new(
            self.temperature.compute(&ctx) as f32,
            self.humidity.compute(&ctx) as f32,
            self.continentalness.compute(&ctx) as f32,
            self.erosion.compute(&ctx) as f32,
            self.depth.compute(&ctx) as f32,
            self.weirdness.compute(&ctx) as f32,
        )
    }

    /// Searches outward from the origin for the column that best matches `spawn_target`,
    /// penalising distance from the origin.
    pub fn find_spawn_position(&self) -> IVec3 {
        let mut finder = SpawnFinder {
            sampler: self,
            result: self.spawn_fitness(0, 0),
        };
        finder.radial_search(2048.0, 512.0);
        finder.radial_search(512.0, 32.0);
        finder.result.0
    }

    fn spawn_fitness(&self, x: i32, z: i32) -> (IVec3, i64) {
        let target = TargetPoint {
            depth: QuantizedCoord(0),
            ..self.sample(quart_from_block(x), 0, quart_from_block(z))
        };
        let best = self
            .spawn_target
            .iter()
            .map(|point| point.fitness(&target))
            .min()
            .unwrap_or(i64::MAX);
        let distance = ((x as i64).pow(2) + (z as i64).pow(2)) as f64 / (2500.0 * 2500.0);
        let penalty = (1.0e8 * distance.powi(2)) as i64;
        (IVec3::new(x, 0, z), best.saturating_add(penalty))
    }
}

struct SpawnFinder<'a> {
    sampler: &'a Sampler,
    result: (IVec3, i64),
}

impl SpawnFinder<'_> {
    fn radial_search(&mut self, max_radius: f32, step: f32) {
        let center = self.result.0;
        let mut angle = 0.0f32;
        let mut radius = step;
        while radius <= max_radius {
            let x = center.x + ((angle as f64).sin() * radius as f64) as i32;
            let z = center.z + ((angle as f64).cos() * radius as f64) as i32;
            let candidate = self.sampler.spawn_fitness(x, z);
            if candidate.1 < self.result.1 {
                self.result = candidate;
            }
            angle += step / radius;
            if angle as f64 > TAU {
                angle = 0.0;
                radius += step;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::climate::{Param, ParamPoint, QuantizedCoord, Sampler, TargetPoint};
    use crate::density_function::{DensityFunction, DensityFunctionRef};
    use crate::router::{NoiseRouter, test_support};
    use bevy_math::IVec3;

    fn router_with(temperature: DensityFunctionRef, continentalness: DensityFunctionRef) -> NoiseRouter {
        NoiseRouter {
            temperature,
            continents: continentalness,
            ..test_support::constant_router()
        }
    }

    #[test]
    fn quantize_truncates_in_single_precision() {
        assert_eq!(QuantizedCoord::from(-0.11f32).0, -1100);
        assert_eq!(QuantizedCoord::from(0.99999f32).0, 9999);
        assert_eq!(QuantizedCoord::from(-0.00005f32).0, 0);
        let param: Param = serde_json::from_str("[-0.11, 1.0]").unwrap();
        assert_eq!(param, Param::span(-0.11f32, 1.0f32));
        let single: Param = serde_json::from_str("0.16").unwrap();
        assert_eq!(single.min, single.max);
        assert_eq!(serde_json::to_string(&single).unwrap(), "0.16");
    }

    #[test]
    fn fitness_is_squared_gap() {
        let point = ParamPoint::new(
            Param::span(-0.5f32, 0.5f32),
            Param::from(0.0f32),
            Param::span(0.0f32, 1.0f32),
            Param::from(0.0f32),
            Param::from(0.0f32),
            Param::from(0.0f32),
            0.1f32,
        );
        let inside = TargetPoint::new(0i64, 0, 5000, 0, 0, 0);
        assert_eq!(point.fitness(&inside), 1000 * 1000);
        let outside = TargetPoint::new(7000i64, -300, -200, 0, 0, 0);
        assert_eq!(
            point.fitness(&outside),
            2000 * 2000 + 300 * 300 + 200 * 200 + 1000 * 1000
        );
        assert_eq!(Param::span(-0.5f32, 0.5f32).distance(-5001), 1);
    }

    #[test]
    fn samples_at_quart_positions() {
        let sampler = Sampler::new(
            &router_with(
                DensityFunction::constant(0.5),
                DensityFunction::cache_2d(DensityFunction::y_clamped_gradient(0, 100, 0.0, 1.0)),
            ),
            Vec::new(),
        )
        .unwrap();
        assert!(matches!(*sampler.continentalness, DensityFunction::YClampedGradient { .. }));
        let target = sampler.sample(3, 5, -7);
        assert_eq!(target.temperature.0, 5000);
        assert_eq!(target.continentalness.0, 2000);
        assert_eq!(target.humidity.0, 0);
    }

    #[test]
    fn spawn_stays_at_origin_when_climate_is_flat() {
        let far = ParamPoint::new(1.0f32, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0f32);
        let sampler = Sampler::new(
            &router_with(DensityFunction::constant(-0.3), DensityFunction::zero()),
            vec![far],
        )
        .unwrap();
        assert_eq!(sampler.find_spawn_position(), IVec3::ZERO);
    }
}
