// src/spectrogram/view.rs

use crate::contour::Point;
use crate::spectrogram::Spectrogram;

/// Coordinate services of a spectrogram display.
///
/// Display coordinates have x growing to the right with time and y growing
/// downward, so higher frequencies sit at smaller y.
pub trait CoordinateMapper {
    /// Display position (e.g. a mouse event) to time/frequency.
    fn to_data(&self, x: f64, y: f64) -> Point;

    /// Time/frequency to display position, for hit-testing and drawing.
    fn to_display(&self, point: Point) -> (f64, f64);
}

/// A `width × height` viewport over a time/frequency window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrogramView {
    pub width: f64,
    pub height: f64,
    pub t_min: f64,
    pub t_max: f64,
    pub f_min: f64,
    pub f_max: f64,
}

impl SpectrogramView {
    pub fn new(width: f64, height: f64, time: (f64, f64), freq: (f64, f64)) -> Self {
        Self {
            width,
            height,
            t_min: time.0.min(time.1),
            t_max: time.0.max(time.1),
            f_min: freq.0.min(freq.1),
            f_max: freq.0.max(freq.1),
        }
    }

    /// Viewport covering the whole clip (`0..duration`) and the computed band.
    pub fn for_spectrogram(spec: &Spectrogram, duration: f64, width: f64, height: f64) -> Self {
        let (_, t_last) = spec.time_range();
        Self::new(width, height, (0.0, duration.max(t_last)), spec.freq_range())
    }

    /// Inclusive bounds check. Clicks outside the view are not annotations.
    pub fn contains(&self, point: Point) -> bool {
        point.time >= self.t_min
            && point.time <= self.t_max
            && point.freq >= self.f_min
            && point.freq <= self.f_max
    }

    fn time_span(&self) -> f64 {
        let span = self.t_max - self.t_min;
        if span > 0.0 { span } else { 1.0 }
    }

    fn freq_span(&self) -> f64 {
        let span = self.f_max - self.f_min;
        if span > 0.0 { span } else { 1.0 }
    }
}

impl CoordinateMapper for SpectrogramView {
    fn to_data(&self, x: f64, y: f64) -> Point {
        let time = self.t_min + x / self.width * self.time_span();
        let freq = self.f_min + (self.height - y) / self.height * self.freq_span();
        Point::new(time, freq)
    }

    fn to_display(&self, point: Point) -> (f64, f64) {
        let x = (point.time - self.t_min) / self.time_span() * self.width;
        let y = self.height - (point.freq - self.f_min) / self.freq_span() * self.height;
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> SpectrogramView {
        SpectrogramView::new(1000.0, 400.0, (0.0, 2.0), (0.0, 8000.0))
    }

    #[test]
    fn display_and_data_coordinates_round_trip() {
        let v = view();
        let p = Point::new(0.75, 3000.0);
        let (x, y) = v.to_display(p);
        assert!((x - 375.0).abs() < 1e-9);
        assert!((y - 250.0).abs() < 1e-9);

        let back = v.to_data(x, y);
        assert!((back.time - p.time).abs() < 1e-9);
        assert!((back.freq - p.freq).abs() < 1e-9);
    }

    #[test]
    fn top_left_is_start_time_and_highest_frequency() {
        let p = view().to_data(0.0, 0.0);
        assert_eq!(p, Point::new(0.0, 8000.0));
    }

    #[test]
    fn contains_is_inclusive() {
        let v = view();
        assert!(v.contains(Point::new(2.0, 8000.0)));
        assert!(v.contains(Point::new(0.0, 0.0)));
        assert!(!v.contains(Point::new(2.1, 100.0)));
    }
}
