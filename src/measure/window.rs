use serde::Serialize;
use std::collections::VecDeque;

pub const MAX_WINDOW_POINTS: usize = 30;

/// One throughput observation during a download.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedSample {
    /// Seconds since the transfer started producing data
    pub time: f64,
    /// Megabits per second
    pub speed: f64,
}

/// Sliding window of the most recent samples, used for live charts.
#[derive(Debug, Clone)]
pub struct SpeedWindow {
    points: VecDeque<SpeedSample>,
    max_points: usize,
    min_value: f64,
    max_value: f64,
}

impl Default for SpeedWindow {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SpeedWindow {
    pub fn new(max_points: Option<usize>) -> Self {
        Self {
            points: VecDeque::new(),
            max_points: max_points.unwrap_or(MAX_WINDOW_POINTS),
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        }
    }

    pub fn push(&mut self, sample: SpeedSample) {
        self.points.push_back(sample);
        while self.points.len() > self.max_points {
            self.points.pop_front();
        }
        self.update_bounds();
    }

    fn update_bounds(&mut self) {
        self.min_value = self.points.iter().map(|p| p.speed).fold(f64::INFINITY, f64::min);
        self.max_value = self.points.iter().map(|p| p.speed).fold(f64::NEG_INFINITY, f64::max);
    }

    pub fn points(&self) -> impl Iterator<Item = &SpeedSample> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&SpeedSample> {
        self.points.back()
    }

    /// `(min, max)` speed in the window, `None` when empty.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            None
        } else {
            Some((self.min_value, self.max_value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_drops_oldest() {
        let mut window = SpeedWindow::default();
        for i in 0..35 {
            window.push(SpeedSample { time: i as f64, speed: i as f64 * 2.0 });
        }
        assert_eq!(window.len(), 30);
        assert_eq!(window.points().next().unwrap().time, 5.0);
        assert_eq!(window.latest().unwrap().time, 34.0);
        assert_eq!(window.bounds(), Some((10.0, 68.0)));
    }

    #[test]
    fn test_empty_window() {
        let window = SpeedWindow::new(Some(3));
        assert!(window.is_empty());
        assert_eq!(window.bounds(), None);
        assert!(window.latest().is_none());
    }
}
