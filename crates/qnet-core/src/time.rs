//! Simulated time and timing modes
//!
//! Time is kept as integer picoseconds so that events computed from
//! floating-point delays still order deterministically.

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const PS_PER_SEC: f64 = 1e12;

/// A point in (or span of) simulated time, in picoseconds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    pub const fn from_ps(ps: u64) -> Self {
        Self(ps)
    }

    /// Convert from seconds, rounding to the nearest picosecond
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * PS_PER_SEC).round() as u64)
    }

    pub const fn as_ps(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / PS_PER_SEC
    }

    pub fn saturating_sub(self, other: SimTime) -> SimTime {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn half(self) -> SimTime {
        Self(self.0 / 2)
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        *self = *self + rhs;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        self.saturating_sub(rhs)
    }
}

impl Mul<u64> for SimTime {
    type Output = SimTime;

    fn mul(self, rhs: u64) -> SimTime {
        Self(self.0.saturating_mul(rhs))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}s", self.as_secs_f64())
    }
}

/// Phase of a synchronized timing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum TimingPhase {
    /// Link layer generates elementary entanglement
    #[display("EXTERNAL")]
    External,
    /// Forwarder swaps, purifies and consumes
    #[display("INTERNAL")]
    Internal,
}

/// How nodes coordinate elementary generation with forwarding
///
/// In `Sync` mode time is divided into repeating cycles made of an
/// EXTERNAL phase of length `t_ext` followed by an INTERNAL phase of
/// length `t_int`, starting at time zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", try_from = "RawTimingMode")]
pub enum TimingMode {
    #[default]
    Async,
    Sync { t_ext: SimTime, t_int: SimTime },
}

/// Wire shape of [`TimingMode`] before phase lengths are checked
#[derive(Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum RawTimingMode {
    Async,
    Sync { t_ext: SimTime, t_int: SimTime },
}

impl TryFrom<RawTimingMode> for TimingMode {
    type Error = CoreError;

    fn try_from(raw: RawTimingMode) -> CoreResult<Self> {
        match raw {
            RawTimingMode::Async => Ok(TimingMode::Async),
            RawTimingMode::Sync { t_ext, t_int } => Self::sync_ps(t_ext, t_int),
        }
    }
}

impl TimingMode {
    /// Build a synchronized mode from phase lengths in seconds
    pub fn sync(t_ext_secs: f64, t_int_secs: f64) -> CoreResult<Self> {
        Self::sync_ps(SimTime::from_secs_f64(t_ext_secs), SimTime::from_secs_f64(t_int_secs))
    }

    fn sync_ps(t_ext: SimTime, t_int: SimTime) -> CoreResult<Self> {
        if t_ext == SimTime::ZERO || t_int == SimTime::ZERO {
            return Err(CoreError::InvalidTiming(format!(
                "phase lengths must be positive (t_ext={t_ext}, t_int={t_int})"
            )));
        }
        Ok(Self::Sync { t_ext, t_int })
    }

    /// Reject synchronized modes with an empty phase
    pub fn validated(self) -> CoreResult<Self> {
        match self {
            TimingMode::Async => Ok(self),
            TimingMode::Sync { t_ext, t_int } => Self::sync_ps(t_ext, t_int),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, TimingMode::Async)
    }

    /// Phase in effect at time `t` (always EXTERNAL in async mode)
    pub fn phase_at(&self, t: SimTime) -> TimingPhase {
        match *self {
            TimingMode::Async => TimingPhase::External,
            TimingMode::Sync { t_ext, t_int } => {
                let offset = t.as_ps() % (t_ext + t_int).as_ps();
                if offset < t_ext.as_ps() {
                    TimingPhase::External
                } else {
                    TimingPhase::Internal
                }
            }
        }
    }

    pub fn is_external(&self, t: SimTime) -> bool {
        self.phase_at(t) == TimingPhase::External
    }

    /// End of the EXTERNAL window containing `now`, if `now` is inside one
    pub fn external_window_end(&self, now: SimTime) -> Option<SimTime> {
        match *self {
            TimingMode::Async => None,
            TimingMode::Sync { t_ext, t_int } => {
                let cycle = (t_ext + t_int).as_ps();
                let start = now.as_ps() - now.as_ps() % cycle;
                let end = SimTime::from_ps(start) + t_ext;
                (now < end).then_some(end)
            }
        }
    }

    /// Whether work started at `now` and completing at `t` stays inside the
    /// current EXTERNAL window
    pub fn fits_external(&self, now: SimTime, t: SimTime) -> bool {
        match self {
            TimingMode::Async => true,
            TimingMode::Sync { .. } => self.external_window_end(now).is_some_and(|end| t < end),
        }
    }

    /// Next phase boundary strictly after `now`
    pub fn next_boundary(&self, now: SimTime) -> Option<(SimTime, TimingPhase)> {
        match *self {
            TimingMode::Async => None,
            TimingMode::Sync { t_ext, t_int } => {
                let cycle = (t_ext + t_int).as_ps();
                let start = SimTime::from_ps(now.as_ps() - now.as_ps() % cycle);
                let internal_at = start + t_ext;
                if now < internal_at {
                    Some((internal_at, TimingPhase::Internal))
                } else {
                    Some((internal_at + t_int, TimingPhase::External))
                }
            }
        }
    }
}
