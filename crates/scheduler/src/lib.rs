//! Tick scheduling for animation sessions.
//!
//! [`AnimationClock`] decides when the next frame is due and keeps the trailing
//! [`FpsWindow`] used for the live FPS readout. It never calls back into the
//! session: hosts ask [`AnimationClock::ready_for_frame`], render, then report
//! back with [`AnimationClock::mark_rendered`]. Because the clock is driven
//! through `&mut self`, two ticks for the same session can never overlap.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ClockError {
    #[error("frame rate must be a finite, non-negative number (got {0})")]
    InvalidFrameRate(f32),
}

/// Span of the trailing window used for FPS computation.
pub const FPS_WINDOW: Duration = Duration::from_millis(1000);

/// How often a module wants to be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameInterval {
    Fixed(Duration),
    /// Draw as fast as the host's paint cycle allows.
    Unlimited,
}

impl FrameInterval {
    /// Builds an interval from a frames-per-second value. Zero maps to
    /// `Unlimited`, matching how an uncapped rate is spelled elsewhere.
    pub fn from_fps(fps: f32) -> Result<Self, ClockError> {
        if !fps.is_finite() || fps < 0.0 {
            return Err(ClockError::InvalidFrameRate(fps));
        }
        if fps == 0.0 {
            return Ok(Self::Unlimited);
        }
        Ok(Self::Fixed(Duration::from_secs_f64(1.0 / fps as f64)))
    }

    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self::Unlimited
        } else {
            Self::Fixed(Duration::from_millis(millis))
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited) || matches!(self, Self::Fixed(d) if d.is_zero())
    }

    /// Target frames per second, or `None` for unlimited.
    pub fn target_fps(&self) -> Option<f32> {
        match self {
            Self::Fixed(interval) if !interval.is_zero() => Some(1.0 / interval.as_secs_f32()),
            _ => None,
        }
    }

    fn period(&self) -> Duration {
        match self {
            Self::Fixed(interval) => *interval,
            Self::Unlimited => Duration::ZERO,
        }
    }
}

impl fmt::Display for FrameInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_fps() {
            Some(fps) => write!(f, "{fps:.0} fps"),
            None => f.write_str("unlimited"),
        }
    }
}

/// One delivered tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSample {
    pub index: u64,
    pub at: Instant,
}

/// Samples from the trailing [`FPS_WINDOW`].
#[derive(Debug, Clone, Default)]
pub struct FpsWindow {
    samples: VecDeque<FrameSample>,
}

impl FpsWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, sample: FrameSample) {
        self.samples.push_back(sample);
        self.prune(sample.at);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frames per second over the samples that fall within the last second
    /// before `now`. Fewer than two samples report zero.
    pub fn current_fps(&self, now: Instant) -> f32 {
        let mut in_window = self
            .samples
            .iter()
            .filter(|sample| sample.at <= now && now.duration_since(sample.at) <= FPS_WINDOW);
        let Some(oldest) = in_window.next() else {
            return 0.0;
        };
        let (count, newest) = in_window.fold((1usize, oldest), |(count, _), sample| {
            (count + 1, sample)
        });
        if count < 2 {
            return 0.0;
        }
        let span = newest.at.duration_since(oldest.at).as_secs_f32();
        if span <= f32::EPSILON {
            return 0.0;
        }
        (count - 1) as f32 / span
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.saturating_duration_since(front.at) > FPS_WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockState {
    Disarmed,
    Armed,
    Paused,
}

/// Periodic tick source for a single session.
#[derive(Debug, Clone)]
pub struct AnimationClock {
    interval: FrameInterval,
    state: ClockState,
    next_deadline: Option<Instant>,
    window: FpsWindow,
    next_index: u64,
}

impl AnimationClock {
    pub fn new(interval: FrameInterval) -> Self {
        Self {
            interval,
            state: ClockState::Disarmed,
            next_deadline: None,
            window: FpsWindow::new(),
            next_index: 0,
        }
    }

    pub fn interval(&self) -> FrameInterval {
        self.interval
    }

    /// Changes the cadence. An armed clock re-anchors its next deadline on `now`.
    pub fn set_interval(&mut self, interval: FrameInterval, now: Instant) {
        self.interval = interval;
        if self.state == ClockState::Armed {
            self.next_deadline = Some(now);
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn target_fps(&self) -> Option<f32> {
        self.interval.target_fps()
    }

    pub fn is_unlimited(&self) -> bool {
        self.interval.is_unlimited()
    }

    /// Starts tick delivery; the first frame is due immediately.
    pub fn arm(&mut self, now: Instant) {
        self.state = ClockState::Armed;
        self.next_deadline = Some(now);
    }

    pub fn disarm(&mut self) {
        self.state = ClockState::Disarmed;
        self.next_deadline = None;
    }

    pub fn pause(&mut self) {
        if self.state == ClockState::Armed {
            self.state = ClockState::Paused;
            self.next_deadline = None;
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.state == ClockState::Paused {
            self.state = ClockState::Armed;
            self.next_deadline = Some(now);
        }
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        self.state == ClockState::Armed && self.next_deadline.is_some_and(|due| now >= due)
    }

    /// Instant at which the next frame becomes due, if ticking.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    /// Records the frame just drawn and schedules the next one. A clock that has
    /// fallen a whole interval behind re-anchors on `now` instead of bursting.
    pub fn mark_rendered(&mut self, now: Instant) -> FrameSample {
        let sample = FrameSample {
            index: self.next_index,
            at: now,
        };
        self.next_index = self.next_index.saturating_add(1);
        self.window.record(sample);

        if self.state == ClockState::Armed {
            let period = self.interval.period();
            let anchor = self.next_deadline.unwrap_or(now);
            let mut next = anchor + period;
            if period.is_zero() || next <= now {
                next = now + period;
            }
            self.next_deadline = Some(next);
        }
        sample
    }

    pub fn current_fps(&self, now: Instant) -> f32 {
        self.window.current_fps(now)
    }

    pub fn samples(&self) -> &FpsWindow {
        &self.window
    }
}
