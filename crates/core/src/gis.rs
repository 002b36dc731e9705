//! GIS display helpers for the `gis` output group.

use serde::Serialize;

/// Centroid of an annotation geometry, built from the raw `x`/`y` columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl Point {
    pub fn new(x: Option<f64>, y: Option<f64>) -> Self {
        Self { x, y }
    }
}

/// Map a stored unit code to its display name.
///
/// Perimeter units use the linear codes, area units the squared ones.
/// Unknown codes yield `None` and the field is left null.
pub fn unit_name(code: i64) -> Option<&'static str> {
    match code {
        0 => Some("px"),
        1 => Some("mm"),
        2 => Some("µm"),
        3 => Some("px²"),
        4 => Some("mm²"),
        5 => Some("µm²"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_units_resolve() {
        assert_eq!(unit_name(0), Some("px"));
        assert_eq!(unit_name(1), Some("mm"));
        assert_eq!(unit_name(2), Some("µm"));
    }

    #[test]
    fn area_units_resolve() {
        assert_eq!(unit_name(3), Some("px²"));
        assert_eq!(unit_name(4), Some("mm²"));
        assert_eq!(unit_name(5), Some("µm²"));
    }

    #[test]
    fn unknown_unit_is_none() {
        assert_eq!(unit_name(42), None);
        assert_eq!(unit_name(-1), None);
    }
}
