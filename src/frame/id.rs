//! Frame identifiers and per-flow sequence numbers.
//!
//! Identifiers are derived from a monotonic microsecond clock. The generator
//! owns its state and its clock, so producers share one by reference and
//! tests inject a clock they control.

use std::{
    sync::atomic::{AtomicU16, AtomicU64, Ordering},
    time::Instant,
};

use derive_more::{Display, From, Into};

/// Identifier of a frame in flight.
///
/// Identifiers wrap after 2^32 microseconds; collisions across a wrap are a
/// tolerated limitation of the 32-bit wire field.
///
/// # Examples
///
/// ```
/// use framecast::frame::FrameId;
/// let id = FrameId::new(42);
/// assert_eq!(id.get(), 42);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Into)]
#[display("{_0}")]
pub struct FrameId(u32);

impl FrameId {
    /// Create a new identifier.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }
}

/// Monotonic microsecond source.
pub trait Clock: Send + Sync {
    /// Microseconds elapsed since an arbitrary fixed origin.
    fn now_micros(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct SteadyClock {
    origin: Instant,
}

impl SteadyClock {
    /// Start a clock whose origin is the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SteadyClock {
    fn default() -> Self { Self::new() }
}

impl Clock for SteadyClock {
    fn now_micros(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Produces strictly increasing stamps and the frame identifiers derived from
/// them.
#[derive(Debug)]
pub struct FrameIdGenerator<C = SteadyClock> {
    clock: C,
    last: AtomicU64,
}

impl FrameIdGenerator<SteadyClock> {
    /// Create a generator driven by a fresh [`SteadyClock`].
    #[must_use]
    pub fn steady() -> Self { Self::new(SteadyClock::new()) }
}

impl<C: Clock> FrameIdGenerator<C> {
    /// Create a generator reading `clock`.
    #[must_use]
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            last: AtomicU64::new(0),
        }
    }

    /// Return the next stamp: the current clock reading, or one past the
    /// previous stamp when the clock has not advanced.
    pub fn next_stamp(&self) -> u64 {
        let now = self.clock.now_micros();
        let advance = |last: u64| if now > last { now } else { last.wrapping_add(1) };
        match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(advance(last)))
        {
            Ok(previous) | Err(previous) => advance(previous),
        }
    }

    /// Generate and return the next [`FrameId`].
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the wire carries the low 32 bits of the stamp"
    )]
    pub fn next_id(&self) -> FrameId { FrameId::new(self.next_stamp() as u32) }
}

/// Wrapping per-flow frame numbering.
#[derive(Debug, Default)]
pub struct FlowSequencer {
    next: AtomicU16,
}

impl FlowSequencer {
    /// Start numbering at `first`.
    #[must_use]
    pub const fn starting_at(first: u16) -> Self {
        Self {
            next: AtomicU16::new(first),
        }
    }

    /// Return the next frame number, wrapping after `u16::MAX`.
    pub fn next_number(&self) -> u16 { self.next.fetch_add(1, Ordering::Relaxed) }
}
