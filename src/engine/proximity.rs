// src/engine/proximity.rs

use crate::contour::Point;
use crate::spectrogram::CoordinateMapper;

/// Distance used to decide which point a click lands on.
///
/// Seconds and Hertz are not comparable, so every implementation first puts
/// both axes on a common scale.
pub trait PointDistance {
    fn distance(&self, a: Point, b: Point) -> f64;
}

/// Euclidean distance after dividing each axis by its own unit.
///
/// With `time_unit_s = 0.01` and `freq_unit_hz = 10`, a point 10 ms away on
/// the same frequency is at distance 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledDistance {
    pub time_unit_s: f64,
    pub freq_unit_hz: f64,
}

impl Default for ScaledDistance {
    fn default() -> Self {
        Self {
            time_unit_s: 0.01,
            freq_unit_hz: 10.0,
        }
    }
}

impl PointDistance for ScaledDistance {
    fn distance(&self, a: Point, b: Point) -> f64 {
        let dt = (a.time - b.time) / self.time_unit_s;
        let df = (a.freq - b.freq) / self.freq_unit_hz;
        dt.hypot(df)
    }
}

/// Euclidean distance in display units, through the view's coordinate mapping.
pub struct DisplayDistance<'a, M: CoordinateMapper + ?Sized> {
    mapper: &'a M,
}

impl<'a, M: CoordinateMapper + ?Sized> DisplayDistance<'a, M> {
    pub fn new(mapper: &'a M) -> Self {
        Self { mapper }
    }
}

impl<M: CoordinateMapper + ?Sized> PointDistance for DisplayDistance<'_, M> {
    fn distance(&self, a: Point, b: Point) -> f64 {
        let (ax, ay) = self.mapper.to_display(a);
        let (bx, by) = self.mapper.to_display(b);
        (ax - bx).hypot(ay - by)
    }
}
