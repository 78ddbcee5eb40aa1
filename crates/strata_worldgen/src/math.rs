//! Scalar helpers with the exact operation order the generator depends on. Swapping one of
//! these for an algebraically equal form changes low bits and therefore the terrain.

#[inline]
pub fn lerp(delta: f64, start: f64, end: f64) -> f64 {
    start + delta * (end - start)
}

#[inline]
pub fn lerp2(delta_x: f64, delta_y: f64, x0y0: f64, x1y0: f64, x0y1: f64, x1y1: f64) -> f64 {
    lerp(delta_y, lerp(delta_x, x0y0, x1y0), lerp(delta_x, x0y1, x1y1))
}

#[inline]
#[allow(clippy::too_many_arguments)]
pub fn lerp3(
    delta_x: f64,
    delta_y: f64,
    delta_z: f64,
    x0y0z0: f64,
    x1y0z0: f64,
    x0y1z0: f64,
    x1y1z0: f64,
    x0y0z1: f64,
    x1y0z1: f64,
    x0y1z1: f64,
    x1y1z1: f64,
) -> f64 {
    lerp(
        delta_z,
        lerp2(delta_x, delta_y, x0y0z0, x1y0z0, x0y1z0, x1y1z0),
        lerp2(delta_x, delta_y, x0y0z1, x1y0z1, x0y1z1, x1y1z1),
    )
}

#[inline]
pub fn inverse_lerp(value: f64, start: f64, end: f64) -> f64 {
    (value - start) / (end - start)
}

#[inline]
pub fn clamped_lerp(start: f64, end: f64, delta: f64) -> f64 {
    if delta < 0.0 {
        start
    } else if delta > 1.0 {
        end
    } else {
        lerp(delta, start, end)
    }
}

#[inline]
pub fn map(value: f64, from_start: f64, from_end: f64, to_start: f64, to_end: f64) -> f64 {
    lerp(inverse_lerp(value, from_start, from_end), to_start, to_end)
}

#[inline]
pub fn clamped_map(value: f64, from_start: f64, from_end: f64, to_start: f64, to_end: f64) -> f64 {
    clamped_lerp(to_start, to_end, inverse_lerp(value, from_start, from_end))
}

/// Clamp that never panics on an inverted range; NaN passes through.
#[inline]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min { min } else { min_nan(value, max) }
}

/// `min` that propagates NaN from either side.
#[inline]
pub fn min_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

/// `max` that propagates NaN from either side.
#[inline]
pub fn max_nan(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

#[inline]
pub fn smoothstep(t: f64) -> f64 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
pub fn floor_div(a: i32, b: i32) -> i32 {
    a.div_euclid(b)
}

/// Round half up, as opposed to `f64::round` which rounds half away from zero.
#[inline]
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[inline]
pub fn quart_from_block(block: i32) -> i32 {
    block >> 2
}

#[inline]
pub fn quart_to_block(quart: i32) -> i32 {
    quart << 2
}

#[cfg(test)]
mod test {
    use crate::math::*;

    #[test]
    fn clamped_map_saturates() {
        assert_eq!(clamped_map(-100.0, -64.0, 320.0, 1.0, -1.0), 1.0);
        assert_eq!(clamped_map(400.0, -64.0, 320.0, 1.0, -1.0), -1.0);
        assert_eq!(clamped_map(128.0, -64.0, 320.0, 1.0, -1.0), 0.0);
    }

    #[test]
    fn clamp_is_total() {
        assert_eq!(clamp(5.0, 0.0, 1.0), 1.0);
        assert_eq!(clamp(-5.0, 0.0, 1.0), 0.0);
        assert!(clamp(f64::NAN, 0.0, 1.0).is_nan());
        assert_eq!(clamp(0.5, 1.0, 0.0), 1.0);
    }

    #[test]
    fn rounding_and_division() {
        assert_eq!(round_half_up(-2.5), -2);
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(floor_div(-1, 8), -1);
        assert_eq!(floor_div(-8, 8), -1);
        assert_eq!(floor_div(-9, 8), -2);
        assert_eq!(quart_from_block(-1), -1);
        assert_eq!(quart_to_block(quart_from_block(7)), 4);
    }

    #[test]
    fn lerp3_corners() {
        let corners = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let at = |x, y, z| {
            lerp3(
                x, y, z, corners[0], corners[1], corners[2], corners[3], corners[4], corners[5],
                corners[6], corners[7],
            )
        };
        assert_eq!(at(0.0, 0.0, 0.0), 1.0);
        assert_eq!(at(1.0, 0.0, 0.0), 2.0);
        assert_eq!(at(0.0, 1.0, 0.0), 3.0);
        assert_eq!(at(1.0, 1.0, 1.0), 8.0);
        assert_eq!(at(0.5, 0.5, 0.5), 4.5);
    }
}
