//! Time is never read from a global clock; there is no global mutable
//! state in this crate. Callers pass the current tick explicitly -- the
//! trace assimilator is handed `req_started` rather than sampling a
//! clock mid-walk.

/// A monotonic tick count, in units of `1/hz` seconds. With the default
/// `HZ` this is milliseconds, mirroring the Linux `jiffies` the original
/// client compares leases against.
pub type Jiffies = u64;

pub const DEFAULT_HZ: u64 = 1000;

/// `ttl = req_started + duration_ms * HZ / 1000`
pub fn lease_ttl(req_started: Jiffies, duration_ms: u64, hz: u64) -> Jiffies {
    req_started.saturating_add(duration_ms.saturating_mul(hz) / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_at_default_hz_is_milliseconds() {
        assert_eq!(lease_ttl(1_000, 10_000, DEFAULT_HZ), 11_000);
    }

    #[test]
    fn ttl_saturates_instead_of_overflowing() {
        assert_eq!(lease_ttl(u64::MAX - 1, 10_000, DEFAULT_HZ), u64::MAX);
    }
}
