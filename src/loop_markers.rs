/// A-B loop markers plus the last unconfirmed waveform click.
///
/// Invariant: when both `start` and `end` are set, `start < end`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMarkers {
    start: Option<f64>,
    end: Option<f64>,
    clicked_time: Option<f64>,
}

impl LoopMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    pub fn clicked_time(&self) -> Option<f64> {
        self.clicked_time
    }

    pub fn is_looping(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// `(start, end)` when a complete loop region is set.
    pub fn region(&self) -> Option<(f64, f64)> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        }
    }

    pub fn set_clicked_time(&mut self, t: f64, duration: f64) {
        let t = if t.is_finite() { t } else { 0.0 };
        self.clicked_time = Some(t.clamp(0.0, duration.max(0.0)));
    }

    /// Commits the clicked time as the loop start. Returns false when there
    /// was no click to commit.
    pub fn commit_start(&mut self) -> bool {
        let Some(clicked) = self.clicked_time else {
            return false;
        };
        self.start = Some(clicked);
        if matches!(self.end, Some(end) if clicked >= end) {
            self.end = None;
        }
        true
    }

    /// Commits the clicked time as the loop end. A click at or before the
    /// current start becomes the new start instead and drops the end.
    pub fn commit_end(&mut self) -> bool {
        let Some(clicked) = self.clicked_time else {
            return false;
        };
        if matches!(self.start, Some(start) if clicked <= start) {
            self.start = Some(clicked);
            self.end = None;
            return true;
        }
        self.end = Some(clicked);
        true
    }

    pub fn clear(&mut self) {
        self.start = None;
        self.end = None;
    }

    /// Forget markers and the pending click; used when a new file replaces the asset.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(m: &mut LoopMarkers, t: f64) {
        m.set_clicked_time(t, 10.0);
    }

    #[test]
    fn clicked_time_is_clamped_to_duration() {
        let mut m = LoopMarkers::new();
        for (t, want) in [(-3.0, 0.0), (0.0, 0.0), (4.25, 4.25), (10.0, 10.0), (99.0, 10.0)] {
            click(&mut m, t);
            assert_eq!(m.clicked_time(), Some(want));
        }
        m.set_clicked_time(f64::NAN, 10.0);
        assert_eq!(m.clicked_time(), Some(0.0));
    }

    #[test]
    fn clicking_does_not_touch_markers() {
        let mut m = LoopMarkers::new();
        click(&mut m, 2.0);
        assert!(m.commit_start());
        click(&mut m, 7.0);
        assert_eq!(m.start(), Some(2.0));
        assert_eq!(m.end(), None);
    }

    #[test]
    fn start_then_end_makes_a_loop() {
        let mut m = LoopMarkers::new();
        click(&mut m, 2.0);
        m.commit_start();
        click(&mut m, 5.0);
        m.commit_end();
        assert!(m.is_looping());
        assert_eq!(m.region(), Some((2.0, 5.0)));
    }

    #[test]
    fn end_at_or_before_start_becomes_new_start() {
        for clicked in [1.0, 3.0] {
            let mut m = LoopMarkers::new();
            click(&mut m, 3.0);
            m.commit_start();
            click(&mut m, clicked);
            assert!(m.commit_end());
            assert_eq!(m.start(), Some(clicked));
            assert_eq!(m.end(), None);
            assert!(!m.is_looping());
        }
    }

    #[test]
    fn early_end_click_drops_existing_loop() {
        let mut m = LoopMarkers::new();
        click(&mut m, 1.0);
        m.commit_start();
        click(&mut m, 4.0);
        m.commit_end();
        click(&mut m, 0.5);
        m.commit_end();
        assert_eq!(m.region(), None);
        assert_eq!(m.start(), Some(0.5));
    }

    #[test]
    fn start_past_end_clears_end() {
        let mut m = LoopMarkers::new();
        click(&mut m, 1.0);
        m.commit_start();
        click(&mut m, 4.0);
        m.commit_end();
        click(&mut m, 4.0);
        m.commit_start();
        assert_eq!(m.start(), Some(4.0));
        assert_eq!(m.end(), None);
        assert!(!m.is_looping());

        click(&mut m, 6.0);
        m.commit_end();
        click(&mut m, 5.0);
        m.commit_start();
        assert_eq!(m.region(), Some((5.0, 6.0)));
    }

    #[test]
    fn end_without_start_is_allowed() {
        let mut m = LoopMarkers::new();
        click(&mut m, 5.0);
        m.commit_end();
        assert_eq!(m.end(), Some(5.0));
        assert!(!m.is_looping());
        click(&mut m, 2.0);
        m.commit_start();
        assert_eq!(m.region(), Some((2.0, 5.0)));
    }

    #[test]
    fn commits_without_click_are_noops() {
        let mut m = LoopMarkers::new();
        assert!(!m.commit_start());
        assert!(!m.commit_end());
        assert_eq!(m, LoopMarkers::new());
    }

    #[test]
    fn clear_always_resets_markers() {
        let mut m = LoopMarkers::new();
        m.clear();
        assert_eq!((m.start(), m.end(), m.is_looping()), (None, None, false));
        click(&mut m, 1.0);
        m.commit_start();
        click(&mut m, 2.0);
        m.commit_end();
        m.clear();
        assert_eq!((m.start(), m.end(), m.is_looping()), (None, None, false));
        assert_eq!(m.clicked_time(), Some(2.0));
    }
}
