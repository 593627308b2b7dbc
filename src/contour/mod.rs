// src/contour/mod.rs

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// POINTS & ROLES
// ==========================================

/// One click on the spectrogram: a time (seconds) and a frequency (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub time: f64,
    pub freq: f64,
}

impl Point {
    pub fn new(time: f64, freq: f64) -> Self {
        Self { time, freq }
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.freq.is_finite()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={:.3}s, f={:.0}Hz", self.time, self.freq)
    }
}

/// Position-derived label of a point inside a finished contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Onset,
    Changepoint,
    Offset,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Onset => "onset",
            Role::Changepoint => "changepoint",
            Role::Offset => "offset",
        }
    }
}

/// Stable sort by time. Equal times keep their click order.
pub(crate) fn sort_by_time(points: &mut [Point]) {
    points.sort_by(|a, b| a.time.total_cmp(&b.time));
}

// ==========================================
// FINISHED CONTOUR
// ==========================================

/// A closed contour. The point list is always non-empty and sorted by time,
/// so roles are a pure function of position and never go stale.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedContour {
    points: Vec<Point>,
}

impl FinishedContour {
    /// Sorts `points` by time and closes them into a contour.
    /// Returns `None` for an empty set; finished contours are never empty.
    pub fn from_points(mut points: Vec<Point>) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        sort_by_time(&mut points);
        Some(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Earliest point. Equal to `offset()` for a single-point contour.
    pub fn onset(&self) -> Point {
        self.points[0]
    }

    /// Latest point.
    pub fn offset(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    /// Role of the point at `index`. A lone point reports `Onset`; it is the
    /// onset and the offset at the same time.
    pub fn role_at(&self, index: usize) -> Option<Role> {
        let last = self.points.len().checked_sub(1)?;
        if index > last {
            None
        } else if index == 0 {
            Some(Role::Onset)
        } else if index == last {
            Some(Role::Offset)
        } else {
            Some(Role::Changepoint)
        }
    }

    pub fn roles(&self) -> Vec<Role> {
        (0..self.points.len()).filter_map(|i| self.role_at(i)).collect()
    }

    pub fn changepoints(&self) -> &[Point] {
        if self.points.len() <= 2 {
            &[]
        } else {
            &self.points[1..self.points.len() - 1]
        }
    }

    pub fn labeled(&self) -> impl Iterator<Item = (Point, Role)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter_map(move |(i, p)| self.role_at(i).map(|role| (*p, role)))
    }

    pub fn syllable(&self) -> Syllable {
        Syllable::from_points(&self.points)
    }

    /// Removes one point. Sorted order is preserved, so the remaining roles
    /// are already correct. The caller drops the contour if it is now empty.
    pub(crate) fn remove(&mut self, index: usize) -> Point {
        self.points.remove(index)
    }

    pub fn into_points(self) -> Vec<Point> {
        self.points
    }
}

// ==========================================
// DERIVED SUMMARIES
// ==========================================

/// Bounding box of a finished contour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Syllable {
    pub t_onset: f64,
    pub t_offset: f64,
    pub f_min: f64,
    pub f_max: f64,
}

impl Syllable {
    fn from_points(points: &[Point]) -> Self {
        let mut bbox = Syllable {
            t_onset: f64::INFINITY,
            t_offset: f64::NEG_INFINITY,
            f_min: f64::INFINITY,
            f_max: f64::NEG_INFINITY,
        };
        for p in points {
            bbox.t_onset = bbox.t_onset.min(p.time);
            bbox.t_offset = bbox.t_offset.max(p.time);
            bbox.f_min = bbox.f_min.min(p.freq);
            bbox.f_max = bbox.f_max.max(p.freq);
        }
        bbox
    }

    pub fn duration(&self) -> f64 {
        self.t_offset - self.t_onset
    }

    pub fn bandwidth(&self) -> f64 {
        self.f_max - self.f_min
    }
}

/// Per-contour numbers written next to the contours for downstream analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyllableMetrics {
    pub syllable_index: usize,
    pub onset_time: f64,
    pub offset_time: f64,
    pub syllable_duration: f64,
    pub frequency_min: f64,
    pub frequency_max: f64,
    pub frequency_spread: f64,
    pub num_points: usize,
}

impl SyllableMetrics {
    pub fn from_contour(syllable_index: usize, contour: &FinishedContour) -> Self {
        let bbox = contour.syllable();
        Self {
            syllable_index,
            onset_time: bbox.t_onset,
            offset_time: bbox.t_offset,
            syllable_duration: bbox.duration(),
            frequency_min: bbox.f_min,
            frequency_max: bbox.f_max,
            frequency_spread: bbox.bandwidth(),
            num_points: contour.len(),
        }
    }
}

/// Axis-aligned time/frequency rectangle, inclusive on all four edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub t_lo: f64,
    pub t_hi: f64,
    pub f_lo: f64,
    pub f_hi: f64,
}

impl Region {
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            t_lo: a.time.min(b.time),
            t_hi: a.time.max(b.time),
            f_lo: a.freq.min(b.freq),
            f_hi: a.freq.max(b.freq),
        }
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.time >= self.t_lo && p.time <= self.t_hi && p.freq >= self.f_lo && p.freq <= self.f_hi
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[t: {:.2}-{:.2}, f: {:.0}-{:.0}]",
            self.t_lo, self.t_hi, self.f_lo, self.f_hi
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(t: f64, f: f64) -> Point {
        Point::new(t, f)
    }

    #[test]
    fn roles_follow_time_order_not_click_order() {
        let contour =
            FinishedContour::from_points(vec![p(0.3, 4000.0), p(0.1, 2000.0), p(0.2, 3000.0)])
                .unwrap();

        assert_eq!(contour.onset(), p(0.1, 2000.0));
        assert_eq!(contour.offset(), p(0.3, 4000.0));
        assert_eq!(
            contour.roles(),
            vec![Role::Onset, Role::Changepoint, Role::Offset]
        );
        assert_eq!(contour.changepoints(), &[p(0.2, 3000.0)]);
    }

    #[test]
    fn single_point_is_both_onset_and_offset() {
        let contour = FinishedContour::from_points(vec![p(0.5, 1200.0)]).unwrap();
        assert_eq!(contour.onset(), contour.offset());
        assert!(contour.changepoints().is_empty());
        assert_eq!(contour.roles(), vec![Role::Onset]);
    }

    #[test]
    fn empty_point_set_is_not_a_contour() {
        assert!(FinishedContour::from_points(Vec::new()).is_none());
    }

    #[test]
    fn equal_times_keep_click_order() {
        let contour =
            FinishedContour::from_points(vec![p(0.2, 500.0), p(0.1, 100.0), p(0.2, 900.0)])
                .unwrap();
        assert_eq!(contour.points()[1], p(0.2, 500.0));
        assert_eq!(contour.points()[2], p(0.2, 900.0));
    }

    #[test]
    fn roles_are_stable_across_recomputation() {
        let contour =
            FinishedContour::from_points(vec![p(0.1, 1.0), p(0.4, 2.0), p(0.2, 3.0), p(0.3, 4.0)])
                .unwrap();
        assert_eq!(contour.roles(), contour.roles());
    }

    #[test]
    fn removal_relabels_remaining_points() {
        let mut contour =
            FinishedContour::from_points(vec![p(0.1, 1.0), p(0.2, 2.0), p(0.3, 3.0)]).unwrap();
        contour.remove(0);
        assert_eq!(contour.onset(), p(0.2, 2.0));
        assert_eq!(contour.roles(), vec![Role::Onset, Role::Offset]);
    }

    #[test]
    fn syllable_metrics_summarise_bounding_box() {
        let contour =
            FinishedContour::from_points(vec![p(0.2, 3000.0), p(0.1, 2500.0), p(0.4, 1500.0)])
                .unwrap();
        let m = SyllableMetrics::from_contour(3, &contour);
        assert_eq!(m.syllable_index, 3);
        assert_eq!(m.onset_time, 0.1);
        assert_eq!(m.offset_time, 0.4);
        assert!((m.syllable_duration - 0.3).abs() < 1e-12);
        assert_eq!(m.frequency_min, 1500.0);
        assert_eq!(m.frequency_max, 3000.0);
        assert_eq!(m.frequency_spread, 1500.0);
        assert_eq!(m.num_points, 3);
    }

    #[test]
    fn region_is_inclusive_and_order_independent() {
        let region = Region::from_corners(p(0.5, 5000.0), p(0.1, 1500.0));
        assert!(region.contains(&p(0.1, 1500.0)));
        assert!(region.contains(&p(0.5, 5000.0)));
        assert!(!region.contains(&p(0.50001, 3000.0)));
        assert_eq!(region.to_string(), "[t: 0.10-0.50, f: 1500-5000]");
    }
}
