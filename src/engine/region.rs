// src/engine/region.rs

use crate::contour::Point;

/// Ctrl-click sequence for region extraction.
///
/// The first corner arms the machine; the second one hands both corners back
/// and disarms it. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RegionMarker {
    #[default]
    AwaitingFirst,
    AwaitingSecond { onset: Point },
}

impl RegionMarker {
    /// Feeds one corner. Returns the corner pair once the second arrives.
    pub fn advance(&mut self, corner: Point) -> Option<(Point, Point)> {
        match *self {
            RegionMarker::AwaitingFirst => {
                *self = RegionMarker::AwaitingSecond { onset: corner };
                None
            }
            RegionMarker::AwaitingSecond { onset } => {
                *self = RegionMarker::AwaitingFirst;
                Some((onset, corner))
            }
        }
    }

    /// Drops a half-finished sequence. Returns the discarded corner, if any.
    pub fn reset(&mut self) -> Option<Point> {
        let pending = self.pending();
        *self = RegionMarker::AwaitingFirst;
        pending
    }

    pub fn pending(&self) -> Option<Point> {
        match self {
            RegionMarker::AwaitingFirst => None,
            RegionMarker::AwaitingSecond { onset } => Some(*onset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_corners_complete_a_cycle() {
        let mut marker = RegionMarker::default();
        assert_eq!(marker.advance(Point::new(0.1, 1500.0)), None);
        assert_eq!(marker.pending(), Some(Point::new(0.1, 1500.0)));

        let pair = marker.advance(Point::new(0.5, 5000.0));
        assert_eq!(pair, Some((Point::new(0.1, 1500.0), Point::new(0.5, 5000.0))));
        assert_eq!(marker, RegionMarker::AwaitingFirst);
    }

    #[test]
    fn reset_discards_pending_corner() {
        let mut marker = RegionMarker::default();
        marker.advance(Point::new(0.2, 800.0));
        assert_eq!(marker.reset(), Some(Point::new(0.2, 800.0)));
        assert_eq!(marker.reset(), None);
        assert_eq!(marker.advance(Point::new(0.9, 900.0)), None);
    }
}
