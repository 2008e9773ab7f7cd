//! Pull-to-refresh recognizer.
//!
//! A gesture only counts as a pull when the container sat at scroll offset 0
//! at touch-start; anything else is an ordinary scroll and is left alone.

/// Minimum downward pull, in pixels, before a release triggers a refresh.
pub const PULL_THRESHOLD: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PullState {
    Idle,
    Tracking { start_y: f32, current_y: f32 },
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    Ignored,
    /// `prevent_default` is set only while the pull is positive.
    Pulling { distance: f32, prevent_default: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndOutcome {
    Ignored,
    Released { distance: f32 },
    Triggered { distance: f32 },
}

#[derive(Debug, Clone)]
pub struct PullRecognizer {
    threshold: f32,
    state: PullState,
    last_scroll_top: f32,
}

impl Default for PullRecognizer {
    fn default() -> Self {
        Self::new(PULL_THRESHOLD)
    }
}

impl PullRecognizer {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: PullState::Idle,
            last_scroll_top: 0.0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn state(&self) -> PullState {
        self.state
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.state, PullState::Refreshing)
    }

    pub fn last_scroll_top(&self) -> f32 {
        self.last_scroll_top
    }

    /// `(start_y, current_y)`; both read 0 outside a tracked gesture.
    pub fn positions(&self) -> (f32, f32) {
        match self.state {
            PullState::Tracking { start_y, current_y } => (start_y, current_y),
            _ => (0.0, 0.0),
        }
    }

    pub fn pull_distance(&self) -> Option<f32> {
        match self.state {
            PullState::Tracking { start_y, current_y } => Some(current_y - start_y),
            _ => None,
        }
    }

    /// Returns true when the touch starts a tracked pull.
    pub fn touch_start(&mut self, y: f32, scroll_top: f32) -> bool {
        if self.is_refreshing() {
            return false;
        }
        self.last_scroll_top = scroll_top;
        if scroll_top == 0.0 {
            self.state = PullState::Tracking {
                start_y: y,
                current_y: y,
            };
            true
        } else {
            self.state = PullState::Idle;
            false
        }
    }

    pub fn touch_move(&mut self, y: f32) -> MoveOutcome {
        match &mut self.state {
            PullState::Tracking { start_y, current_y } => {
                *current_y = y;
                let distance = *current_y - *start_y;
                MoveOutcome::Pulling {
                    distance,
                    prevent_default: distance > 0.0,
                }
            }
            _ => MoveOutcome::Ignored,
        }
    }

    /// On `Triggered` the caller owns starting the refresh action and must
    /// call [`settle`](Self::settle) once it finishes.
    pub fn touch_end(&mut self) -> EndOutcome {
        let PullState::Tracking { start_y, current_y } = self.state else {
            return EndOutcome::Ignored;
        };
        let distance = current_y - start_y;
        if distance > self.threshold {
            self.state = PullState::Refreshing;
            EndOutcome::Triggered { distance }
        } else {
            self.state = PullState::Idle;
            EndOutcome::Released { distance }
        }
    }

    /// Abandons a tracked gesture. A refresh in flight is left alone.
    pub fn cancel(&mut self) -> bool {
        if matches!(self.state, PullState::Tracking { .. }) {
            self.state = PullState::Idle;
            true
        } else {
            false
        }
    }

    /// Success and failure settle the same way.
    pub fn settle(&mut self) -> bool {
        if self.is_refreshing() {
            self.state = PullState::Idle;
            true
        } else {
            false
        }
    }
}
