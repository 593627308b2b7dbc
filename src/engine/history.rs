// src/engine/history.rs

use crate::contour::{FinishedContour, Point};

/// What one successful "Clear Previous" did.
#[derive(Debug, Clone, PartialEq)]
pub enum ClearEvent {
    /// The most recently clicked point was dropped from the current contour.
    RemovedPoint(Point),
    /// The most recently finished contour was reopened for editing.
    ReopenedContour(FinishedContour),
}

impl ClearEvent {
    /// A description for the console (e.g., "Remove Point")
    pub fn name(&self) -> &str {
        match self {
            ClearEvent::RemovedPoint(_) => "Remove Point",
            ClearEvent::ReopenedContour(_) => "Reopen Contour",
        }
    }
}

/// Bounded LIFO record of clear events.
///
/// The depth is the documented limit of how far "Clear Previous" reaches
/// back. Events beyond it are forgotten oldest-first.
#[derive(Debug, Clone)]
pub struct ClearHistory {
    events: Vec<ClearEvent>,
    max_depth: usize,
}

impl ClearHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            events: Vec::with_capacity(max_depth),
            max_depth,
        }
    }

    pub fn push(&mut self, event: ClearEvent) {
        self.events.push(event);

        // Trim history if too long
        while self.events.len() > self.max_depth {
            self.events.remove(0);
        }
    }

    pub fn last(&self) -> Option<&ClearEvent> {
        self.events.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClearEvent> {
        self.events.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for ClearHistory {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_max_depth_most_recent_events() {
        let mut history = ClearHistory::new(2);
        history.push(ClearEvent::RemovedPoint(Point::new(0.1, 1.0)));
        history.push(ClearEvent::RemovedPoint(Point::new(0.2, 2.0)));
        history.push(ClearEvent::RemovedPoint(Point::new(0.3, 3.0)));

        assert_eq!(history.len(), 2);
        assert_eq!(
            history.last(),
            Some(&ClearEvent::RemovedPoint(Point::new(0.3, 3.0)))
        );
        let newest_first: Vec<_> = history.iter().cloned().collect();
        assert_eq!(newest_first[1], ClearEvent::RemovedPoint(Point::new(0.2, 2.0)));
    }

    #[test]
    fn zero_depth_records_nothing() {
        let mut history = ClearHistory::new(0);
        history.push(ClearEvent::RemovedPoint(Point::new(0.1, 1.0)));
        assert!(history.is_empty());
    }
}
