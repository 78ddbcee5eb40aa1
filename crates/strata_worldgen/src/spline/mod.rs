use bevy_math::FloatExt;
use std::fmt::{Debug, Formatter};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SplineError {
    #[error("spline locations must be strictly ascending, got {location} after {previous}")]
    InvalidOrder { location: f32, previous: f32 },
    #[error("a multipoint spline needs at least one point")]
    Empty,
    #[error("spline arrays differ in length: {locations} locations, {values} values, {derivatives} derivatives")]
    LengthMismatch {
        locations: usize,
        values: usize,
        derivatives: usize,
    },
}

/// Something a spline can read its coordinate from, evaluated against a context `C`.
pub trait SplineFunction<C: ?Sized>: RangeFunction {
    fn apply(&self, ctx: &C) -> f32;
}

pub trait RangeFunction {
    fn min_value(&self) -> f32;

    fn max_value(&self) -> f32;
}

#[derive(PartialEq)]
pub enum CubicSpline<F> {
    Constant(f32),
    MultiPoint {
        coordinate: F,
        locations: Vec<f32>,
        values: Vec<CubicSpline<F>>,
        derivatives: Vec<f32>,
        min_value: f32,
        max_value: f32,
    },
}

impl<F: Debug> Debug for CubicSpline<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CubicSpline::Constant(v) => write!(f, "{}", v),
            CubicSpline::MultiPoint {
                coordinate,
                locations,
                values,
                derivatives,
                min_value,
                max_value,
            } => f
                .debug_struct("MultiPoint")
                .field("min_value", min_value)
                .field("max_value", max_value)
                .field("locations", locations)
                .field("derivatives", derivatives)
                .field("coordinate", coordinate)
                .field("values", values)
                .finish(),
        }
    }
}

impl<F: Clone> Clone for CubicSpline<F> {
    fn clone(&self) -> Self {
        match self {
            CubicSpline::Constant(v) => CubicSpline::Constant(*v),
            CubicSpline::MultiPoint {
                coordinate,
                locations,
                values,
                derivatives,
                min_value,
                max_value,
            } => CubicSpline::MultiPoint {
                coordinate: coordinate.clone(),
                locations: locations.clone(),
                values: values.clone(),
                derivatives: derivatives.clone(),
                min_value: *min_value,
                max_value: *max_value,
            },
        }
    }
}

impl<F: RangeFunction> CubicSpline<F> {
    /// Builds a multipoint spline and precomputes output bounds that hold for every
    /// coordinate value in the coordinate's own range, extrapolation included.
    pub fn multipoint(
        coordinate: F,
        locations: Vec<f32>,
        values: Vec<CubicSpline<F>>,
        derivatives: Vec<f32>,
    ) -> Result<Self, SplineError> {
        if locations.len() != values.len() || locations.len() != derivatives.len() {
            return Err(SplineError::LengthMismatch {
                locations: locations.len(),
                values: values.len(),
                derivatives: derivatives.len(),
            });
        }
        if locations.is_empty() {
            return Err(SplineError::Empty);
        }
        for pair in locations.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SplineError::InvalidOrder {
                    location: pair[1],
                    previous: pair[0],
                });
            }
        }

        let n = locations.len() - 1;
        let mut spline_min = f32::INFINITY;
        let mut spline_max = f32::NEG_INFINITY;

        let coordinate_min = coordinate.min_value();
        let coordinate_max = coordinate.max_value();
        if coordinate_min < locations[0] {
            let extend_min = linear_extend(
                coordinate_min,
                &locations,
                values[0].min_value(),
                &derivatives,
                0,
            );
            let extend_max = linear_extend(
                coordinate_min,
                &locations,
                values[0].max_value(),
                &derivatives,
                0,
            );
            spline_min = spline_min.min(extend_min.min(extend_max));
            spline_max = spline_max.max(extend_min.max(extend_max));
        }
        if coordinate_max > locations[n] {
            let extend_min = linear_extend(
                coordinate_max,
                &locations,
                values[n].min_value(),
                &derivatives,
                n,
            );
            let extend_max = linear_extend(
                coordinate_max,
                &locations,
                values[n].max_value(),
                &derivatives,
                n,
            );
            spline_min = spline_min.min(extend_min.min(extend_max));
            spline_max = spline_max.max(extend_min.max(extend_max));
        }
        for v in &values {
            spline_min = spline_min.min(v.min_value());
            spline_max = spline_max.max(v.max_value());
        }
        for i in 0..n {
            let location_delta = locations[i + 1] - locations[i];
            let min_left = values[i].min_value();
            let max_left = values[i].max_value();
            let min_right = values[i + 1].min_value();
            let max_right = values[i + 1].max_value();
            let derivative_left = derivatives[i];
            let derivative_right = derivatives[i + 1];
            if derivative_left != 0.0 || derivative_right != 0.0 {
                // the cubic term is f(1-f) * lerp(f, left, right) with f(1-f) <= 1/4
                let value_delta_left = derivative_left * location_delta;
                let value_delta_right = derivative_right * location_delta;
                let min_value = min_left.min(min_right);
                let max_value = max_left.max(max_right);
                let min_delta_left = value_delta_left - max_right + min_left;
                let max_delta_left = value_delta_left - min_right + max_left;
                let min_delta_right = -value_delta_right + min_right - max_left;
                let max_delta_right = -value_delta_right + max_right - min_left;
                let min_delta = min_delta_left.min(min_delta_right);
                let max_delta = max_delta_left.max(max_delta_right);
                spline_min = spline_min.min(min_value + 0.25 * min_delta);
                spline_max = spline_max.max(max_value + 0.25 * max_delta);
            }
        }
        Ok(CubicSpline::MultiPoint {
            coordinate,
            locations,
            values,
            derivatives,
            min_value: spline_min,
            max_value: spline_max,
        })
    }

    /// Rebuilds the spline with every coordinate (nested ones too) replaced by `visitor`.
    /// Bounds are recomputed from the new coordinates.
    pub fn try_map_all<G, E, V>(&self, visitor: &mut V) -> Result<CubicSpline<G>, E>
    where
        G: RangeFunction,
        E: From<SplineError>,
        V: FnMut(&F) -> Result<G, E>,
    {
        match self {
            CubicSpline::Constant(v) => Ok(CubicSpline::Constant(*v)),
            CubicSpline::MultiPoint {
                coordinate,
                locations,
                values,
                derivatives,
                ..
            } => {
                let coordinate = visitor(coordinate)?;
                let values = values
                    .iter()
                    .map(|v| v.try_map_all(visitor))
                    .collect::<Result<Vec<_>, E>>()?;
                Ok(CubicSpline::multipoint(
                    coordinate,
                    locations.clone(),
                    values,
                    derivatives.clone(),
                )?)
            }
        }
    }
}

impl<C: ?Sized, F: SplineFunction<C>> SplineFunction<C> for CubicSpline<F> {
    fn apply(&self, ctx: &C) -> f32 {
        match self {
            CubicSpline::Constant(v) => *v,
            CubicSpline::MultiPoint {
                coordinate,
                locations,
                values,
                derivatives,
                ..
            } => {
                let coordinate = coordinate.apply(ctx);
                let i = find_interval_start(locations, coordinate);
                let n = locations.len() as isize - 1;
                if i < 0 {
                    linear_extend(coordinate, locations, values[0].apply(ctx), derivatives, 0)
                } else if i >= n {
                    linear_extend(
                        coordinate,
                        locations,
                        values[n as usize].apply(ctx),
                        derivatives,
                        n as usize,
                    )
                } else {
                    let i = i as usize;
                    let loc0 = locations[i];
                    let loc1 = locations[i + 1];
                    let der0 = derivatives[i];
                    let der1 = derivatives[i + 1];
                    let f = (coordinate - loc0) / (loc1 - loc0);

                    let value0 = values[i].apply(ctx);
                    let value1 = values[i + 1].apply(ctx);
                    if der0 == 0.0 && der1 == 0.0 {
                        return value0.lerp(value1, f);
                    }

                    let left = der0 * (loc1 - loc0) - (value1 - value0);
                    let right = -der1 * (loc1 - loc0) + (value1 - value0);

                    value0.lerp(value1, f) + f * (1.0 - f) * left.lerp(right, f)
                }
            }
        }
    }
}

impl<F> RangeFunction for CubicSpline<F> {
    fn min_value(&self) -> f32 {
        match self {
            CubicSpline::Constant(v) => *v,
            CubicSpline::MultiPoint { min_value, .. } => *min_value,
        }
    }

    fn max_value(&self) -> f32 {
        match self {
            CubicSpline::Constant(v) => *v,
            CubicSpline::MultiPoint { max_value, .. } => *max_value,
        }
    }
}

impl<F> From<f32> for CubicSpline<F> {
    #[inline]
    fn from(value: f32) -> Self {
        CubicSpline::Constant(value)
    }
}

pub struct Builder<F> {
    coordinate: F,
    locations: Vec<f32>,
    values: Vec<CubicSpline<F>>,
    derivatives: Vec<f32>,
}

impl<F: RangeFunction> Builder<F> {
    pub fn new(coordinate: F) -> Self {
        Self {
            coordinate,
            locations: Vec::new(),
            values: Vec::new(),
            derivatives: Vec::new(),
        }
    }

    pub fn add_point<V: Into<CubicSpline<F>>>(
        mut self,
        location: f32,
        value: V,
        derivative: f32,
    ) -> Result<Self, SplineError> {
        if let Some(&previous) = self.locations.last()
            && location <= previous
        {
            return Err(SplineError::InvalidOrder { location, previous });
        }
        self.locations.push(location);
        self.values.push(value.into());
        self.derivatives.push(derivative);
        Ok(self)
    }

    pub fn build(self) -> Result<CubicSpline<F>, SplineError> {
        CubicSpline::multipoint(
            self.coordinate,
            self.locations,
            self.values,
            self.derivatives,
        )
    }
}

#[inline]
fn find_interval_start(locations: &[f32], point: f32) -> isize {
    binary_search(0, locations.len(), |i| point < locations[i]) as isize - 1
}

fn linear_extend(point: f32, locations: &[f32], value: f32, derivatives: &[f32], i: usize) -> f32 {
    let f = derivatives[i];
    if f == 0.0 {
        value
    } else {
        value + f * (point - locations[i])
    }
}

fn binary_search<F>(min: usize, max: usize, predicate: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let mut min = min;
    let mut max = max;
    while min < max {
        let mid = min + (max - min) / 2;
        if predicate(mid) {
            max = mid;
        } else {
            min = mid + 1;
        }
    }
    min
}

#[cfg(test)]
mod test {
    use crate::spline::test::CoordinateFunction::{Bounded, Identity, Square};
    use crate::spline::{Builder, CubicSpline, RangeFunction, SplineError, SplineFunction};
    use strata_random::Random;
    use strata_random::xoroshiro::XoroshiroRandom;

    #[derive(Debug, Clone, PartialEq)]
    enum CoordinateFunction {
        Identity,
        Square,
        Bounded(f32, f32),
    }

    impl RangeFunction for CoordinateFunction {
        fn min_value(&self) -> f32 {
            match self {
                Bounded(min, _) => *min,
                _ => f32::NEG_INFINITY,
            }
        }

        fn max_value(&self) -> f32 {
            match self {
                Bounded(_, max) => *max,
                _ => f32::INFINITY,
            }
        }
    }

    impl SplineFunction<f32> for CoordinateFunction {
        fn apply(&self, ctx: &f32) -> f32 {
            match self {
                Identity | Bounded(..) => *ctx,
                Square => *ctx * *ctx,
            }
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn simple() -> Result<(), SplineError> {
        let spline = Builder::new(Identity)
            .add_point(-1.1, 0.044, 0.0)?
            .add_point(-1.02, -0.2222, 0.0)?
            .add_point(-0.51, -0.2222, 0.0)?
            .add_point(-0.44, -0.12, 0.0)?
            .add_point(-0.18, -0.12, 0.0)?
            .build()?;
        assert_eq!(spline.apply(&-1.6), 0.044);
        assert_eq!(spline.apply(&-0.7), -0.2222);
        assert_eq!(spline.apply(&-0.2), -0.12);
        assert!(close(spline.apply(&-0.5), -0.20760001));
        Ok(())
    }

    #[test]
    fn derivatives() -> Result<(), SplineError> {
        let spline = Builder::new(Identity)
            .add_point(0.0, 0.0178, 0.2)?
            .add_point(0.3, 0.23, 0.7)?
            .add_point(0.46, 0.89, -0.03)?
            .add_point(0.6, 0.4, 0.0)?
            .build()?;
        assert_eq!(spline.apply(&0.0), 0.0178);
        assert!(close(spline.apply(&-0.1), -0.0022000019));
        assert!(close(spline.apply(&0.31), 0.24358201));
        assert!(close(spline.apply(&0.4), 0.69171876));
        Ok(())
    }

    #[test]
    fn nested() -> Result<(), SplineError> {
        let inner = Builder::new(Square)
            .add_point(-0.1, 0.0, 0.0)?
            .add_point(1.2, 0.4, 0.0)?
            .build()?;
        let spline = Builder::new(Identity)
            .add_point(0.0, 0.23, 0.0)?
            .add_point(0.2, inner, 0.0)?
            .add_point(0.7, 0.7, 0.0)?
            .build()?;
        assert!(close(spline.apply(&0.3), 0.18676923));
        Ok(())
    }

    #[test]
    fn flat_knots_interpolate_linearly() -> Result<(), SplineError> {
        let spline = Builder::new(Bounded(-1.0, 1.0))
            .add_point(-1.0, -2.0, 0.0)?
            .add_point(1.0, 2.0, 0.0)?
            .build()?;
        assert_eq!(spline.min_value(), -2.0);
        assert_eq!(spline.max_value(), 2.0);
        assert_eq!(spline.apply(&-1.0), -2.0);
        assert_eq!(spline.apply(&-0.5), -1.0);
        assert_eq!(spline.apply(&0.0), 0.0);
        assert_eq!(spline.apply(&0.5), 1.0);
        assert_eq!(spline.apply(&0.75), 1.5);
        assert_eq!(spline.apply(&1.0), 2.0);
        assert_eq!(spline.apply(&5.0), 2.0);

        // one sloped knot brings the cubic term back
        let sloped = Builder::new(Bounded(-1.0, 1.0))
            .add_point(-1.0, -2.0, 0.0)?
            .add_point(1.0, 2.0, 1.0)?
            .build()?;
        assert_ne!(sloped.apply(&0.5), 1.0);
        Ok(())
    }

    #[test]
    fn invalid_splines_are_rejected() {
        let result = Builder::new(Identity)
            .add_point(0.5, 1.0, 0.0)
            .and_then(|b| b.add_point(0.5, 2.0, 0.0));
        assert!(matches!(result, Err(SplineError::InvalidOrder { .. })));

        let result = Builder::new(Identity)
            .add_point(0.5, 1.0, 0.0)
            .and_then(|b| b.add_point(-0.5, 2.0, 0.0));
        assert!(matches!(
            result,
            Err(SplineError::InvalidOrder {
                location: -0.5,
                previous: 0.5
            })
        ));

        assert!(matches!(
            Builder::<CoordinateFunction>::new(Identity).build(),
            Err(SplineError::Empty)
        ));
        assert!(matches!(
            CubicSpline::multipoint(Identity, vec![0.0], vec![], vec![0.0]),
            Err(SplineError::LengthMismatch { .. })
        ));
    }

    fn random_spline(
        random: &mut XoroshiroRandom,
        depth: u32,
    ) -> Result<CubicSpline<CoordinateFunction>, SplineError> {
        let points = 1 + random.next_u32_bound(4);
        let mut builder = Builder::new(Bounded(-2.0, 2.0));
        let mut location = -1.5;
        for _ in 0..points {
            location += 0.1 + random.next_f32();
            let derivative = random.next_f32() * 4.0 - 2.0;
            if depth > 0 && random.next_bool() {
                let value = random_spline(random, depth - 1)?;
                builder = builder.add_point(location, value, derivative)?;
            } else {
                builder = builder.add_point(location, random.next_f32() * 2.0 - 1.0, derivative)?;
            }
        }
        builder.build()
    }

    #[test]
    fn bounds_hold_for_every_coordinate() -> Result<(), SplineError> {
        let mut random = XoroshiroRandom::new(2024);
        for _ in 0..200 {
            let spline = random_spline(&mut random, 2)?;
            let (min, max) = (spline.min_value(), spline.max_value());
            for step in 0..=400 {
                let t = -2.0 + step as f32 * 0.01;
                let value = spline.apply(&t);
                assert!(
                    value >= min - 1e-4 && value <= max + 1e-4,
                    "{value} outside [{min}, {max}] at {t} for {spline:?}"
                );
            }
        }
        Ok(())
    }

    #[test]
    fn mapping_recomputes_bounds() -> Result<(), SplineError> {
        let spline = Builder::new(Bounded(0.0, 1.0))
            .add_point(0.0, 0.0, 1.0)?
            .add_point(1.0, 1.0, 1.0)?
            .build()?;
        assert_eq!(spline.max_value(), 1.0);
        let widened: CubicSpline<CoordinateFunction> =
            spline.try_map_all(&mut |_| Ok::<_, SplineError>(Bounded(0.0, 3.0)))?;
        assert_eq!(widened.max_value(), 3.0);
        assert_eq!(widened.apply(&3.0), 3.0);
        Ok(())
    }
}
