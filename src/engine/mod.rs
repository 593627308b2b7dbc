// src/engine/mod.rs

pub mod history;
pub mod proximity;
pub mod region;

pub use history::{ClearEvent, ClearHistory};
pub use proximity::{DisplayDistance, PointDistance, ScaledDistance};
pub use region::RegionMarker;

use tracing::{debug, info, warn};

use crate::contour::{FinishedContour, Point, Region, Role, Syllable};
use crate::error::EngineError;

/// Where a point lives inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    Current(usize),
    Finished { contour: usize, index: usize },
}

/// Result of one ctrl-click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionStep {
    /// First corner recorded; waiting for the second.
    OnsetMarked(Point),
    /// Second corner closed the rectangle and a contour was carved out.
    Extracted { points: usize, remaining: usize },
}

/// The contour segmentation engine for one audio file.
///
/// Holds the open point buffer (click order), the finished contours
/// (each sorted by time), the clear history and the ctrl-click state.
/// Every point lives in exactly one of those containers.
#[derive(Debug, Clone)]
pub struct ContourEngine {
    current: Vec<Point>,
    finished: Vec<FinishedContour>,
    history: ClearHistory,
    marker: RegionMarker,
}

impl ContourEngine {
    pub fn new(history_depth: usize) -> Self {
        Self {
            current: Vec::new(),
            finished: Vec::new(),
            history: ClearHistory::new(history_depth),
            marker: RegionMarker::default(),
        }
    }

    /// Engine restored from persisted contours.
    pub fn with_finished(finished: Vec<FinishedContour>, history_depth: usize) -> Self {
        Self {
            finished,
            ..Self::new(history_depth)
        }
    }

    // ==========================================
    // QUERIES
    // ==========================================

    pub fn current(&self) -> &[Point] {
        &self.current
    }

    pub fn finished(&self) -> &[FinishedContour] {
        &self.finished
    }

    pub fn history(&self) -> &ClearHistory {
        &self.history
    }

    pub fn region_marker(&self) -> RegionMarker {
        self.marker
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.finished.is_empty()
    }

    pub fn syllables(&self) -> Vec<Syllable> {
        self.finished.iter().map(FinishedContour::syllable).collect()
    }

    /// (unsaved points in the current contour, points in finished contours)
    pub fn point_counts(&self) -> (usize, usize) {
        let saved = self.finished.iter().map(FinishedContour::len).sum();
        (self.current.len(), saved)
    }

    /// Every point with its role. Points of the open contour have no role yet.
    pub fn labeled_points(&self) -> Vec<(Point, Option<Role>)> {
        self.finished
            .iter()
            .flat_map(|c| c.labeled().map(|(p, role)| (p, Some(role))))
            .chain(self.current.iter().map(|p| (*p, None)))
            .collect()
    }

    /// Closest point strictly within `threshold` of `query`.
    /// Ties go to the first candidate: current contour, then finished
    /// contours in list order.
    pub fn find_nearest(
        &self,
        query: Point,
        threshold: f64,
        metric: &dyn PointDistance,
    ) -> Option<(PointLocation, f64)> {
        let open = self
            .current
            .iter()
            .enumerate()
            .map(|(i, p)| (PointLocation::Current(i), *p));
        let closed = self.finished.iter().enumerate().flat_map(|(c, contour)| {
            contour
                .points()
                .iter()
                .enumerate()
                .map(move |(i, p)| (PointLocation::Finished { contour: c, index: i }, *p))
        });

        open.chain(closed)
            .map(|(loc, p)| (loc, metric.distance(p, query)))
            .filter(|(_, d)| *d < threshold)
            .fold(None, |best, (loc, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((loc, d)),
            })
    }

    // ==========================================
    // EDITING
    // ==========================================

    /// Appends a click to the open contour, in click order.
    pub fn add_point(&mut self, time: f64, freq: f64) -> Result<(), EngineError> {
        let point = Point::new(time, freq);
        if !point.is_finite() {
            warn!("rejected non-finite point (t={time}, f={freq})");
            return Err(EngineError::NonFinitePoint { time, freq });
        }
        self.current.push(point);
        info!("+ Point {}: {}", self.current.len(), point);
        Ok(())
    }

    /// Removes the closest point within `threshold` of (x, y), looking in the
    /// open contour and in every finished contour. A finished contour left
    /// empty is deleted.
    pub fn remove_nearby(
        &mut self,
        x: f64,
        y: f64,
        threshold: f64,
        metric: &dyn PointDistance,
    ) -> bool {
        let Some((location, distance)) = self.find_nearest(Point::new(x, y), threshold, metric)
        else {
            debug!("no point within {threshold} of (t={x:.3}, f={y:.0})");
            return false;
        };

        match location {
            PointLocation::Current(index) => {
                let removed = self.current.remove(index);
                info!("- Removed point from current contour: {removed} (distance {distance:.2})");
            }
            PointLocation::Finished { contour, index } => {
                let removed = self.finished[contour].remove(index);
                if self.finished[contour].is_empty() {
                    self.finished.remove(contour);
                    info!("- Removed point {removed}; contour {} is now empty and was deleted", contour + 1);
                } else {
                    info!("- Removed point from contour {}: {removed}", contour + 1);
                }
            }
        }
        true
    }

    /// Sorts the open contour by time and closes it.
    pub fn finish_contour(&mut self) -> Result<&FinishedContour, EngineError> {
        if self.current.is_empty() {
            warn!("nothing to finish");
            return Err(EngineError::NothingToFinish);
        }
        let points = std::mem::take(&mut self.current);
        let contour = self.push_finished(points)?;
        info!("✓ Contour complete with {} points", contour.len());
        Ok(contour)
    }

    /// Finishes the open contour only if it already has `min_points` points.
    /// Used before leaving a file.
    pub fn finish_if_ready(&mut self, min_points: usize) -> Option<&FinishedContour> {
        if self.current.is_empty() || self.current.len() < min_points {
            return None;
        }
        info!("Auto-finishing contour before navigation...");
        self.finish_contour().ok()
    }

    /// Undoes the most recent point, or reopens the most recent contour when
    /// there are no open points.
    pub fn clear_previous(&mut self) -> Result<ClearEvent, EngineError> {
        let event = if let Some(point) = self.current.pop() {
            info!("- Cleared last point: {point}");
            ClearEvent::RemovedPoint(point)
        } else if let Some(contour) = self.finished.pop() {
            self.current = contour.points().to_vec();
            info!("↺ Reopened contour with {} points", contour.len());
            ClearEvent::ReopenedContour(contour)
        } else {
            debug!("clear previous: nothing to clear");
            return Err(EngineError::NothingToClear);
        };

        self.history.push(event.clone());
        Ok(event)
    }

    /// Drops every point and contour, the clear history and any pending corner.
    pub fn clear_all(&mut self) {
        let (unsaved, saved) = self.point_counts();
        self.current.clear();
        self.finished.clear();
        self.history.clear();
        self.marker.reset();
        info!("✗ Cleared all annotations ({unsaved} unsaved, {saved} saved points)");
    }

    // ==========================================
    // REGION EXTRACTION
    // ==========================================

    /// Ctrl-click handler. The second corner triggers extraction; the marker
    /// is back at the first corner afterwards, even when extraction aborts.
    pub fn mark_region_corner(&mut self, time: f64, freq: f64) -> Result<RegionStep, EngineError> {
        let corner = Point::new(time, freq);
        if !corner.is_finite() {
            return Err(EngineError::NonFinitePoint { time, freq });
        }

        match self.marker.advance(corner) {
            None => {
                info!("marked onset at {corner}");
                Ok(RegionStep::OnsetMarked(corner))
            }
            Some((onset, offset)) => {
                info!("marked offset at {offset}");
                let points = self.extract_region(onset, offset)?.len();
                Ok(RegionStep::Extracted {
                    points,
                    remaining: self.current.len(),
                })
            }
        }
    }

    /// Forgets a half-marked region. Call on file switch or mode change.
    pub fn reset_region_marker(&mut self) {
        if let Some(corner) = self.marker.reset() {
            debug!("discarded pending region corner at {corner}");
        }
    }

    /// Moves every open point inside the rectangle spanned by `a` and `b`
    /// into a new finished contour. Finished contours are never touched.
    pub fn extract_region(&mut self, a: Point, b: Point) -> Result<&FinishedContour, EngineError> {
        let region = Region::from_corners(a, b);
        let found = self.current.iter().filter(|p| region.contains(p)).count();
        if found < 2 {
            warn!("only found {found} point(s) in region {region}");
            return Err(EngineError::InsufficientPoints { region, found });
        }

        let (inside, outside): (Vec<Point>, Vec<Point>) =
            self.current.drain(..).partition(|p| region.contains(p));
        self.current = outside;

        let remaining = self.current.len();
        let contour = self.push_finished(inside)?;
        info!(
            "created contour with {} points → {} points remaining",
            contour.len(),
            remaining
        );
        Ok(contour)
    }

    fn push_finished(&mut self, points: Vec<Point>) -> Result<&FinishedContour, EngineError> {
        let contour = FinishedContour::from_points(points).ok_or(EngineError::NothingToFinish)?;
        self.finished.push(contour);
        Ok(&self.finished[self.finished.len() - 1])
    }
}

impl Default for ContourEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric() -> ScaledDistance {
        ScaledDistance::default()
    }

    fn engine_with(points: &[(f64, f64)]) -> ContourEngine {
        let mut engine = ContourEngine::default();
        for &(t, f) in points {
            engine.add_point(t, f).unwrap();
        }
        engine
    }

    #[test]
    fn add_point_keeps_click_order() {
        let engine = engine_with(&[(0.3, 1.0), (0.1, 2.0)]);
        assert_eq!(engine.current(), &[Point::new(0.3, 1.0), Point::new(0.1, 2.0)]);
    }

    #[test]
    fn add_point_rejects_nan() {
        let mut engine = ContourEngine::default();
        assert!(matches!(
            engine.add_point(f64::NAN, 100.0),
            Err(EngineError::NonFinitePoint { .. })
        ));
        assert!(engine.current().is_empty());
    }

    #[test]
    fn finish_on_empty_contour_is_a_no_op() {
        let mut engine = ContourEngine::default();
        assert_eq!(engine.finish_contour().unwrap_err(), EngineError::NothingToFinish);
        assert!(engine.is_empty());
    }

    #[test]
    fn remove_nearby_picks_the_closest_point_across_contours() {
        let mut engine = engine_with(&[(0.100, 1000.0), (0.200, 2000.0)]);
        engine.finish_contour().unwrap();
        engine.add_point(0.105, 1000.0).unwrap();

        // Query sits 2 ms from the finished point and 3 ms from the open one.
        assert!(engine.remove_nearby(0.102, 1000.0, 1.0, &metric()));
        assert_eq!(engine.current().len(), 1);
        assert_eq!(engine.finished()[0].points(), &[Point::new(0.2, 2000.0)]);
    }

    #[test]
    fn remove_nearby_ignores_points_outside_threshold() {
        let mut engine = engine_with(&[(0.1, 1000.0)]);
        assert!(!engine.remove_nearby(0.2, 1000.0, 1.0, &metric()));
        assert_eq!(engine.current().len(), 1);
    }

    #[test]
    fn removing_last_point_of_finished_contour_deletes_it() {
        let mut engine = engine_with(&[(0.1, 1000.0)]);
        engine.finish_contour().unwrap();
        assert!(engine.remove_nearby(0.1, 1000.0, 1.0, &metric()));
        assert!(engine.finished().is_empty());
    }

    #[test]
    fn clear_previous_pops_point_then_reopens_contour() {
        let mut engine = engine_with(&[(0.2, 2.0), (0.1, 1.0)]);
        engine.finish_contour().unwrap();
        engine.add_point(0.5, 5.0).unwrap();

        let first = engine.clear_previous().unwrap();
        assert_eq!(first, ClearEvent::RemovedPoint(Point::new(0.5, 5.0)));

        let second = engine.clear_previous().unwrap();
        assert!(matches!(second, ClearEvent::ReopenedContour(_)));
        assert_eq!(engine.current(), &[Point::new(0.1, 1.0), Point::new(0.2, 2.0)]);
        assert!(engine.finished().is_empty());
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn clear_all_also_resets_pending_corner_and_history() {
        let mut engine = engine_with(&[(0.1, 1.0)]);
        engine.clear_previous().unwrap();
        engine.mark_region_corner(0.0, 0.0).unwrap();
        engine.clear_all();
        assert!(engine.is_empty());
        assert!(engine.history().is_empty());
        assert_eq!(engine.region_marker(), RegionMarker::AwaitingFirst);
    }

    #[test]
    fn aborted_extraction_still_rearms_the_marker() {
        let mut engine = engine_with(&[(0.3, 3000.0)]);
        engine.mark_region_corner(0.2, 2000.0).unwrap();
        let err = engine.mark_region_corner(0.4, 4000.0).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientPoints { found: 1, .. }));
        assert_eq!(engine.region_marker(), RegionMarker::AwaitingFirst);
    }

    #[test]
    fn extraction_never_touches_finished_contours() {
        let mut engine = engine_with(&[(0.1, 100.0), (0.2, 200.0)]);
        engine.finish_contour().unwrap();
        let err = engine
            .extract_region(Point::new(0.0, 0.0), Point::new(1.0, 1000.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientPoints { found: 0, .. }));
        assert_eq!(engine.finished().len(), 1);
    }

    #[test]
    fn labeled_points_leave_open_points_unlabeled() {
        let mut engine = engine_with(&[(0.1, 1.0), (0.2, 2.0)]);
        engine.finish_contour().unwrap();
        engine.add_point(0.3, 3.0).unwrap();
        let labels: Vec<_> = engine.labeled_points().into_iter().map(|(_, r)| r).collect();
        assert_eq!(labels, vec![Some(Role::Onset), Some(Role::Offset), None]);
    }
}
