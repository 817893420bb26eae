//! Conversion between the model's fixed-point coordinate space (`0..=SCALE`)
//! and the unit square used by executors.

/// Upper bound of the model's coordinate convention.
pub const SCALE: f64 = 999.0;

/// Values with magnitude at or below this are taken as already unit-scaled.
///
/// Known edge case: a model that emits unit coordinates slightly above 1.5
/// gets them divided by `SCALE`. No further disambiguation is attempted.
pub const UNIT_THRESHOLD: f64 = 1.5;

/// A coordinate pair `[x, y]`.
pub type Point = [f64; 2];

/// Keys whose values carry coordinates.
pub const COORDINATE_KEYS: [&str; 3] = ["coordinate", "start_coordinate", "end_coordinate"];

pub fn to_unit(value: f64) -> f64 {
    value / SCALE
}

pub fn to_scaled(value: f64) -> i64 {
    (value * SCALE).round() as i64
}

/// Divides by `SCALE` unless the value already looks unit-scaled.
pub fn normalize_value(value: f64) -> f64 {
    if value.abs() <= UNIT_THRESHOLD {
        value
    } else {
        to_unit(value)
    }
}

/// Inverse of [`normalize_value`]: scales unit values, rounds scaled ones.
pub fn denormalize_value(value: f64) -> i64 {
    if value.abs() <= UNIT_THRESHOLD {
        to_scaled(value)
    } else {
        value.round() as i64
    }
}

/// Collapses a 2- or 4-element coordinate list to a single point.
/// A 4-element list is a bounding box `[x1, y1, x2, y2]` and becomes its center.
pub fn collapse(values: &[f64]) -> Option<Point> {
    match values {
        [x, y] => Some([*x, *y]),
        [x1, y1, x2, y2] => Some([(x1 + x2) / 2.0, (y1 + y2) / 2.0]),
        _ => None,
    }
}

pub fn normalize_point(point: Point) -> Point {
    [normalize_value(point[0]), normalize_value(point[1])]
}

pub fn denormalize_point(point: Point) -> [i64; 2] {
    [denormalize_value(point[0]), denormalize_value(point[1])]
}

pub fn distance(a: Point, b: Point) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_round_trip_within_one_scale_unit() {
        for i in 0..=100 {
            let x = i as f64 / 100.0;
            let back = to_unit(to_scaled(x) as f64);
            assert!((back - x).abs() <= 1.0 / SCALE, "x={x} back={back}");
        }
    }

    #[test]
    fn threshold_decides_convention() {
        assert_eq!(normalize_value(0.25), 0.25);
        assert_eq!(normalize_value(1.5), 1.5);
        assert!((normalize_value(999.0) - 1.0).abs() < 1e-12);
        assert!((normalize_value(1.6) - 1.6 / SCALE).abs() < 1e-12);
    }

    #[test]
    fn bounding_box_collapses_to_center() {
        assert_eq!(collapse(&[10.0, 20.0, 30.0, 40.0]), Some([20.0, 30.0]));
        assert_eq!(collapse(&[3.0, 4.0]), Some([3.0, 4.0]));
        assert_eq!(collapse(&[1.0, 2.0, 3.0]), None);
    }

    #[test]
    fn denormalize_leaves_scaled_values() {
        assert_eq!(denormalize_point([0.5, 1.0]), [500, 999]);
        assert_eq!(denormalize_point([250.0, 0.0]), [250, 0]);
    }
}
