//! A single upstream target and its in-flight slot counter.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// A backend service reachable at one `host:port`.
#[derive(Debug)]
pub struct UpstreamTarget {
    authority: String,
    max_in_flight: usize,
    in_flight: AtomicUsize,
}

impl UpstreamTarget {
    pub fn new(authority: impl Into<String>, max_in_flight: usize) -> Self {
        Self {
            authority: authority.into(),
            max_in_flight,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Claim a slot, or `None` if the target is saturated.
    pub fn try_acquire(self: &Arc<Self>) -> Option<InFlightGuard> {
        let mut prev = self.in_flight.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_in_flight {
                return None;
            }
            match self.in_flight.compare_exchange_weak(prev, prev + 1, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
        metrics::set_upstream_in_flight(&self.authority, prev + 1);
        Some(InFlightGuard { target: self.clone() })
    }

    fn release(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        metrics::set_upstream_in_flight(&self.authority, prev.saturating_sub(1));
    }
}

/// Holds one in-flight slot; released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    target: Arc<UpstreamTarget>,
}

impl Deref for InFlightGuard {
    type Target = UpstreamTarget;

    fn deref(&self) -> &Self::Target {
        &self.target
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.target.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_bounded_and_released() {
        let target = Arc::new(UpstreamTarget::new("projects:4002", 2));

        let a = target.try_acquire().unwrap();
        let b = target.try_acquire().unwrap();
        assert!(target.try_acquire().is_none());
        assert_eq!(target.in_flight(), 2);
        assert_eq!(a.authority(), "projects:4002");

        drop(a);
        assert_eq!(target.in_flight(), 1);
        let _c = target.try_acquire().unwrap();
        drop(b);
        assert_eq!(target.in_flight(), 1);
    }

    #[test]
    fn test_concurrent_acquire_never_exceeds_limit() {
        let target = Arc::new(UpstreamTarget::new("t:80", 10));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let target = target.clone();
                std::thread::spawn(move || {
                    let mut held = Vec::new();
                    for _ in 0..100 {
                        if let Some(guard) = target.try_acquire() {
                            assert!(target.in_flight() <= 10);
                            held.push(guard);
                        }
                        if held.len() > 2 {
                            held.remove(0);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(target.in_flight(), 0);
    }
}
