//! Address picker strategies (§4.4 step 2b). Each picker maps an attempt
//! index onto a candidate address inside a pool; the retry loop in
//! [`crate::engine`] walks attempts until it finds a free address or
//! exhausts the pool's retry budget.

use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

use rand::Rng;
use siphasher::sip::SipHasher13;

use config_backend::entity::{PdPool, Pool4, Pool6};

fn span4(pool: &Pool4) -> u32 {
    u32::from(pool.end) - u32::from(pool.start)
}

fn span6(pool: &Pool6) -> u128 {
    u128::from(pool.end) - u128::from(pool.start)
}

/// Number of delegable prefixes in a pd-pool, minus one (an inclusive span,
/// matching [`span4`]/[`span6`]). `delegated_len >= prefix_len` is enforced
/// by [`config_backend::entity::Subnet6::validate`].
fn span_pd(pool: &PdPool) -> u128 {
    (1u128 << (pool.delegated_len - pool.prefix_len)) - 1
}

fn pd_prefix_at(pool: &PdPool, offset: u128) -> Ipv6Addr {
    let stride = 1u128 << (128 - pool.delegated_len);
    Ipv6Addr::from(u128::from(pool.prefix) + offset * stride)
}

/// A v4 address picker. `seed` is a per-request stable value (typically the
/// client identifier or hardware address bytes) so [`HashedPicker4`] returns
/// the same first candidate for the same client across requests.
pub trait Picker4: std::fmt::Debug + Send + Sync {
    /// Returns `None` once `attempt` has walked past the pool's last address
    /// (§4.4 "bounded retry count configured per subnet").
    fn candidate(&self, pool: &Pool4, seed: &[u8], attempt: u32) -> Option<Ipv4Addr>;
}

/// The v6 analogue of [`Picker4`].
pub trait Picker6: std::fmt::Debug + Send + Sync {
    fn candidate(&self, pool: &Pool6, seed: &[u8], attempt: u32) -> Option<Ipv6Addr>;
}

/// A prefix-delegation picker: maps an attempt onto a whole delegated
/// prefix inside a [`PdPool`] rather than a single address.
pub trait PickerPd: std::fmt::Debug + Send + Sync {
    fn candidate(&self, pool: &PdPool, seed: &[u8], attempt: u32) -> Option<Ipv6Addr>;
}

/// Walks the pool from its first address upward. Ties on exact collision
/// retries resolve to the smaller address by construction (§4.4).
#[derive(Debug, Default, Clone, Copy)]
pub struct IterativePicker;

impl Picker4 for IterativePicker {
    fn candidate(&self, pool: &Pool4, _seed: &[u8], attempt: u32) -> Option<Ipv4Addr> {
        if u64::from(attempt) > u64::from(span4(pool)) {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(pool.start) + attempt))
    }
}

impl Picker6 for IterativePicker {
    fn candidate(&self, pool: &Pool6, _seed: &[u8], attempt: u32) -> Option<Ipv6Addr> {
        if u128::from(attempt) > span6(pool) {
            return None;
        }
        Some(Ipv6Addr::from(u128::from(pool.start) + u128::from(attempt)))
    }
}

impl PickerPd for IterativePicker {
    fn candidate(&self, pool: &PdPool, _seed: &[u8], attempt: u32) -> Option<Ipv6Addr> {
        if u128::from(attempt) > span_pd(pool) {
            return None;
        }
        Some(pd_prefix_at(pool, u128::from(attempt)))
    }
}

/// Draws a uniformly random offset into the pool on every attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPicker;

impl Picker4 for RandomPicker {
    fn candidate(&self, pool: &Pool4, _seed: &[u8], _attempt: u32) -> Option<Ipv4Addr> {
        let span = span4(pool);
        let offset = rand::thread_rng().gen_range(0..=span);
        Some(Ipv4Addr::from(u32::from(pool.start) + offset))
    }
}

impl Picker6 for RandomPicker {
    fn candidate(&self, pool: &Pool6, _seed: &[u8], _attempt: u32) -> Option<Ipv6Addr> {
        let span = span6(pool);
        let offset = rand::thread_rng().gen_range(0..=span);
        Some(Ipv6Addr::from(u128::from(pool.start) + offset))
    }
}

impl PickerPd for RandomPicker {
    fn candidate(&self, pool: &PdPool, _seed: &[u8], _attempt: u32) -> Option<Ipv6Addr> {
        let span = span_pd(pool);
        let offset = rand::thread_rng().gen_range(0..=span);
        Some(pd_prefix_at(pool, offset))
    }
}

/// SipHash-1-3 of `(seed, attempt)` modulo the pool's span — deterministic
/// and stable across process restarts, unlike `DefaultHasher`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashedPicker;

impl HashedPicker {
    fn hash(seed: &[u8], attempt: u32) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(0, 0);
        seed.hash(&mut hasher);
        attempt.hash(&mut hasher);
        hasher.finish()
    }
}

impl Picker4 for HashedPicker {
    fn candidate(&self, pool: &Pool4, seed: &[u8], attempt: u32) -> Option<Ipv4Addr> {
        let span = u64::from(span4(pool));
        let offset = Self::hash(seed, attempt) % (span + 1);
        Some(Ipv4Addr::from(u32::from(pool.start) + offset as u32))
    }
}

impl Picker6 for HashedPicker {
    fn candidate(&self, pool: &Pool6, seed: &[u8], attempt: u32) -> Option<Ipv6Addr> {
        let span = span6(pool);
        let offset = (Self::hash(seed, attempt) as u128) % (span + 1);
        Some(Ipv6Addr::from(u128::from(pool.start) + offset))
    }
}

impl PickerPd for HashedPicker {
    fn candidate(&self, pool: &PdPool, seed: &[u8], attempt: u32) -> Option<Ipv6Addr> {
        let span = span_pd(pool);
        let offset = (Self::hash(seed, attempt) as u128) % (span + 1);
        Some(pd_prefix_at(pool, offset))
    }
}

/// Selects which picker a subnet's pools use. Configured per subnet in the
/// full system; the engine takes it as a constructor parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerStrategy {
    Iterative,
    Random,
    Hashed,
}

impl PickerStrategy {
    pub fn picker4(self) -> Box<dyn Picker4> {
        match self {
            PickerStrategy::Iterative => Box::new(IterativePicker),
            PickerStrategy::Random => Box::new(RandomPicker),
            PickerStrategy::Hashed => Box::new(HashedPicker),
        }
    }

    pub fn picker6(self) -> Box<dyn Picker6> {
        match self {
            PickerStrategy::Iterative => Box::new(IterativePicker),
            PickerStrategy::Random => Box::new(RandomPicker),
            PickerStrategy::Hashed => Box::new(HashedPicker),
        }
    }

    pub fn picker_pd(self) -> Box<dyn PickerPd> {
        match self {
            PickerStrategy::Iterative => Box::new(IterativePicker),
            PickerStrategy::Random => Box::new(RandomPicker),
            PickerStrategy::Hashed => Box::new(HashedPicker),
        }
    }

    /// Parses a subnet's `allocator` parameter (§9 "configured per subnet");
    /// unset or unrecognized values fall back to [`PickerStrategy::Iterative`],
    /// matching the source's default picker.
    pub fn from_parameter(value: Option<&str>) -> Self {
        match value {
            Some("random") => PickerStrategy::Random,
            Some("hashed") => PickerStrategy::Hashed,
            _ => PickerStrategy::Iterative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool4(start: &str, end: &str) -> Pool4 {
        Pool4 {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
            client_classes: vec![],
        }
    }

    #[test]
    fn iterative_walks_ascending_and_terminates_at_span() {
        let pool = pool4("192.0.2.2", "192.0.2.4");
        let picker = IterativePicker;
        assert_eq!(picker.candidate(&pool, b"", 0), Some("192.0.2.2".parse().unwrap()));
        assert_eq!(picker.candidate(&pool, b"", 2), Some("192.0.2.4".parse().unwrap()));
        assert_eq!(picker.candidate(&pool, b"", 3), None);
    }

    #[test]
    fn hashed_is_deterministic_for_the_same_seed_and_attempt() {
        let pool = pool4("192.0.2.2", "192.0.2.250");
        let picker = HashedPicker;
        let a = picker.candidate(&pool, b"client-a", 0);
        let b = picker.candidate(&pool, b"client-a", 0);
        assert_eq!(a, b);
        let c = picker.candidate(&pool, b"client-b", 0);
        assert_ne!(a, c);
    }

    #[test]
    fn hashed_candidate_always_within_pool_bounds() {
        let pool = pool4("192.0.2.10", "192.0.2.20");
        let picker = HashedPicker;
        for attempt in 0..50 {
            let ip = picker.candidate(&pool, b"seed", attempt).unwrap();
            assert!(pool.contains(ip));
        }
    }

    fn pd_pool(prefix: &str, prefix_len: u8, delegated_len: u8) -> PdPool {
        PdPool {
            prefix: prefix.parse().unwrap(),
            prefix_len,
            delegated_len,
            client_classes: vec![],
        }
    }

    #[test]
    fn iterative_pd_walks_whole_delegated_prefixes() {
        let pool = pd_pool("2001:db8::", 48, 56);
        let picker = IterativePicker;
        assert_eq!(picker.candidate(&pool, b"", 0), Some("2001:db8::".parse().unwrap()));
        assert_eq!(picker.candidate(&pool, b"", 1), Some("2001:db8:0:100::".parse().unwrap()));
        // span is 2^(56-48) - 1 = 255
        assert!(picker.candidate(&pool, b"", 255).is_some());
        assert_eq!(picker.candidate(&pool, b"", 256), None);
    }

    #[test]
    fn hashed_pd_candidate_always_within_pool_span() {
        let pool = pd_pool("2001:db8::", 48, 52);
        let picker = HashedPicker;
        for attempt in 0..20 {
            let prefix = picker.candidate(&pool, b"duid", attempt).unwrap();
            assert!(u128::from(prefix) >= u128::from(pool.prefix));
            assert!(u128::from(prefix) <= u128::from(pool.prefix) + span_pd(&pool) * (1u128 << (128 - pool.delegated_len)));
        }
    }
}
