// Copyright 2026 recache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Injected time source.
//!
//! Caches never read the process clocks directly. They hold a [`Clock`] so tests can move time forward
//! without touching process-wide state, and so dumps can translate monotonic timestamps into wall-clock
//! timestamps and back.

use std::{
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;

/// A source of wall-clock and monotonic time.
pub trait Clock: Send + Sync + Debug + 'static {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Current monotonic time.
    fn steady_now(&self) -> Instant;

    /// A `(wall, steady)` pair taken back to back.
    fn anchor(&self) -> TimeAnchor {
        TimeAnchor {
            wall: self.now(),
            steady: self.steady_now(),
        }
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The process clocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn steady_now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually driven clock.
///
/// Both clocks start at the given anchor and advance together on [`MockClock::advance`].
/// [`MockClock::advance_wall`] moves only the wall clock, which is what a process restart looks like from
/// the point of view of a dump.
#[derive(Debug)]
pub struct MockClock {
    base: TimeAnchor,
    offsets: Mutex<(Duration, Duration)>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Create a mock clock anchored at the current process time.
    pub fn new() -> Self {
        Self::with_anchor(TimeAnchor {
            wall: SystemTime::now(),
            steady: Instant::now(),
        })
    }

    /// Create a mock clock anchored at an arbitrary `(wall, steady)` pair.
    pub fn with_anchor(base: TimeAnchor) -> Self {
        Self {
            base,
            offsets: Mutex::new((Duration::ZERO, Duration::ZERO)),
        }
    }

    /// Advance both clocks.
    pub fn advance(&self, duration: Duration) {
        let mut offsets = self.offsets.lock();
        offsets.0 += duration;
        offsets.1 += duration;
    }

    /// Advance the wall clock only.
    pub fn advance_wall(&self, duration: Duration) {
        self.offsets.lock().0 += duration;
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        self.base.wall + self.offsets.lock().0
    }

    fn steady_now(&self) -> Instant {
        self.base.steady + self.offsets.lock().1
    }

    fn anchor(&self) -> TimeAnchor {
        let offsets = *self.offsets.lock();
        TimeAnchor {
            wall: self.base.wall + offsets.0,
            steady: self.base.steady + offsets.1,
        }
    }
}

/// A wall-clock time and a monotonic time observed at the same moment.
///
/// Monotonic clocks restart from an arbitrary origin with every process, so a persisted monotonic
/// timestamp is meaningless after a restart. Persisting `steady -> wall` on write and applying
/// `wall -> steady` with a fresh anchor on read keeps `now - update_time` correct across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAnchor {
    /// Wall-clock side of the anchor.
    pub wall: SystemTime,
    /// Monotonic side of the anchor.
    pub steady: Instant,
}

impl TimeAnchor {
    /// Translate a monotonic timestamp into wall-clock time.
    pub fn to_wall(&self, steady: Instant) -> SystemTime {
        let wall = if steady >= self.steady {
            self.wall.checked_add(steady - self.steady)
        } else {
            self.wall.checked_sub(self.steady - steady)
        };
        wall.unwrap_or(UNIX_EPOCH)
    }

    /// Translate a wall-clock timestamp into monotonic time.
    ///
    /// Returns `None` if the result cannot be represented on this process' monotonic clock.
    pub fn to_steady(&self, wall: SystemTime) -> Option<Instant> {
        match wall.duration_since(self.wall) {
            Ok(ahead) => self.steady.checked_add(ahead),
            Err(e) => self.steady.checked_sub(e.duration()),
        }
    }
}

/// Wall-clock time as microseconds since the unix epoch, negative before it.
pub fn to_micros(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_micros() as i64,
        Err(e) => -(e.duration().as_micros() as i64),
    }
}

/// Inverse of [`to_micros`].
pub fn from_micros(micros: i64) -> SystemTime {
    if micros >= 0 {
        UNIX_EPOCH + Duration::from_micros(micros as u64)
    } else {
        UNIX_EPOCH - Duration::from_micros(micros.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let anchor = clock.anchor();

        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.steady_now() - anchor.steady, Duration::from_secs(3));
        assert_eq!(clock.now().duration_since(anchor.wall).unwrap(), Duration::from_secs(3));

        clock.advance_wall(Duration::from_secs(7));
        assert_eq!(clock.steady_now() - anchor.steady, Duration::from_secs(3));
        assert_eq!(clock.now().duration_since(anchor.wall).unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_anchor_rebase() {
        let before = TimeAnchor {
            wall: UNIX_EPOCH + Duration::from_secs(1_000_000),
            steady: Instant::now(),
        };
        let updated = before.steady.checked_sub(Duration::from_secs(2)).unwrap_or(before.steady);
        let age = before.steady - updated;
        let wall = before.to_wall(updated);

        // A later process: wall clock moved 5s, monotonic origin is unrelated.
        let after = TimeAnchor {
            wall: before.wall + Duration::from_secs(5),
            steady: before.steady + Duration::from_secs(1000),
        };
        let rebased = after.to_steady(wall).unwrap();
        assert_eq!(after.steady - rebased, age + Duration::from_secs(5));
    }

    #[test]
    fn test_micros() {
        let t = UNIX_EPOCH + Duration::from_micros(1_234_567);
        assert_eq!(to_micros(t), 1_234_567);
        assert_eq!(from_micros(to_micros(t)), t);

        let t = UNIX_EPOCH - Duration::from_micros(42);
        assert_eq!(to_micros(t), -42);
        assert_eq!(from_micros(-42), t);
    }
}
