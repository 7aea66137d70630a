//! Update urgency tokens.
//!
//! An [`Urgency`] is an absolute expiration timestamp in milliseconds. The
//! earlier an update expires, the more urgent it is, so the derived `Ord`
//! sorts the most urgent token first. The cooperative scheduler orders its
//! ready queue by the same kind of timestamp, which lets a unit's pending
//! urgency be handed to the scheduler as a callback expiration unchanged.

use std::fmt;

/// Milliseconds on the host's monotonic clock.
pub type Millis = i64;

/// A totally ordered urgency token. Smaller values are more urgent.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Urgency(Millis);

impl Urgency {
    /// Work that must be processed synchronously, before anything else.
    pub const SYNC: Urgency = Urgency(Millis::MIN);

    /// Work that never expires on its own.
    pub const NEVER: Urgency = Urgency(Millis::MAX);

    /// Create an urgency from an absolute expiration time.
    pub const fn from_expiration(expiration: Millis) -> Self {
        Urgency(expiration)
    }

    /// Round `now + timeout` up to the next multiple of `bucket`.
    ///
    /// Updates dispatched within the same bucket share an urgency and are
    /// therefore rendered together.
    pub fn bucketed(now: Millis, timeout: Millis, bucket: Millis) -> Self {
        let expiration = now.saturating_add(timeout);
        if bucket <= 1 {
            return Urgency(expiration);
        }
        let rounded = expiration.div_euclid(bucket).saturating_add(1).saturating_mul(bucket);
        if expiration.rem_euclid(bucket) == 0 {
            Urgency(expiration)
        } else {
            Urgency(rounded)
        }
    }

    /// The absolute expiration time carried by this token.
    pub const fn expiration(self) -> Millis {
        self.0
    }

    /// Whether a render running at `self` must process an update at `update`.
    pub fn covers(self, update: Urgency) -> bool {
        update <= self
    }

    /// The more urgent of an optional marker and a new token.
    pub fn most_urgent(current: Option<Urgency>, other: Urgency) -> Urgency {
        match current {
            Some(current) => current.min(other),
            None => other,
        }
    }
}

impl fmt::Debug for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Urgency::SYNC => f.write_str("Urgency(sync)"),
            Urgency::NEVER => f.write_str("Urgency(never)"),
            Urgency(ms) => write!(f, "Urgency({ms}ms)"),
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
