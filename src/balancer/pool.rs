//! The backend pool: least-connections selection plus health state.
//!
//! Held behind a single `parking_lot::Mutex`, taken only for the brief
//! critical sections described in the concurrency model -- selection,
//! counter increment/decrement, and health write-back -- never across an
//! await point.

use parking_lot::Mutex;

/// One backend's address, in-flight request count, and last known health.
#[derive(Debug, Clone)]
pub struct Backend {
    pub address: String,
    pub in_flight: u64,
    pub healthy: bool,
}

impl Backend {
    fn new(address: String) -> Self {
        Self {
            address,
            in_flight: 0,
            healthy: false,
        }
    }
}

/// An explicit pool object passed into the router's state, replacing the
/// upstream's process-global `serversPool` and `mutex`.
pub struct Pool {
    backends: Mutex<Vec<Backend>>,
}

impl Pool {
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        let backends = addresses.into_iter().map(Backend::new).collect();
        Self {
            backends: Mutex::new(backends),
        }
    }

    pub fn len(&self) -> usize {
        self.backends.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selects the healthy backend with the smallest in-flight count,
    /// breaking ties by lowest index, and increments its counter. Returns
    /// `None` (and touches nothing) if no backend is healthy.
    pub fn dispatch(&self) -> Option<usize> {
        let mut backends = self.backends.lock();
        let chosen = backends
            .iter()
            .enumerate()
            .filter(|(_, b)| b.healthy)
            .min_by_key(|(index, b)| (b.in_flight, *index))
            .map(|(index, _)| index)?;
        backends[chosen].in_flight += 1;
        Some(chosen)
    }

    /// Decrements the in-flight count once a dispatched request's forwarded
    /// response has completed (success or failure). Corrects the upstream's
    /// latent bug of never decrementing.
    pub fn complete(&self, index: usize) {
        let mut backends = self.backends.lock();
        if let Some(backend) = backends.get_mut(index) {
            backend.in_flight = backend.in_flight.saturating_sub(1);
        }
    }

    pub fn set_healthy(&self, index: usize, healthy: bool) {
        let mut backends = self.backends.lock();
        if let Some(backend) = backends.get_mut(index) {
            backend.healthy = healthy;
        }
    }

    pub fn address(&self, index: usize) -> Option<String> {
        self.backends.lock().get(index).map(|b| b.address.clone())
    }

    /// A point-in-time copy of every backend's state, for tests and stats.
    pub fn snapshot(&self) -> Vec<Backend> {
        self.backends.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(states: &[(u64, bool)]) -> Pool {
        let pool = Pool::new((0..states.len()).map(|i| format!("server{i}:8080")));
        for (i, (in_flight, healthy)) in states.iter().enumerate() {
            pool.backends.lock()[i].in_flight = *in_flight;
            pool.set_healthy(i, *healthy);
        }
        pool
    }

    #[test]
    fn picks_least_connections_among_healthy_backends() {
        let pool = pool_with(&[(10, true), (20, true), (30, true)]);
        assert_eq!(pool.dispatch(), Some(0));
    }

    #[test]
    fn ties_break_toward_the_lowest_index() {
        let pool = Pool::new(["a".into(), "b".into(), "c".into()]);
        pool.set_healthy(0, true);
        pool.set_healthy(1, true);
        pool.set_healthy(2, true);
        // All start at in_flight = 0: three successive dispatches should
        // land on 0, 1, 2 in that order.
        assert_eq!(pool.dispatch(), Some(0));
        assert_eq!(pool.dispatch(), Some(1));
        assert_eq!(pool.dispatch(), Some(2));
    }

    #[test]
    fn skips_unhealthy_backends() {
        let pool = pool_with(&[(0, false), (0, true), (0, true)]);
        assert_eq!(pool.dispatch(), Some(1));
    }

    #[test]
    fn returns_none_when_nothing_is_healthy() {
        let pool = pool_with(&[(0, false), (0, false)]);
        assert_eq!(pool.dispatch(), None);
    }

    #[test]
    fn selection_shifts_after_counts_change() {
        let pool = pool_with(&[(10, true), (20, true), (30, true)]);
        assert_eq!(pool.dispatch(), Some(0));
        pool.backends.lock()[1].in_flight = 5;
        assert_eq!(pool.dispatch(), Some(1));
    }

    #[test]
    fn complete_decrements_in_flight() {
        let pool = Pool::new(["a".into()]);
        pool.set_healthy(0, true);
        let idx = pool.dispatch().unwrap();
        assert_eq!(pool.snapshot()[idx].in_flight, 1);
        pool.complete(idx);
        assert_eq!(pool.snapshot()[idx].in_flight, 0);
    }
}
