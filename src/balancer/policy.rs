use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::backend::{Backend, HealthySet};
use crate::config::LoadBalancingType;
use crate::error::{SteerError, SteerResult};

/// A selected backend together with its index in the healthy set
#[derive(Debug, Clone)]
pub struct Selection {
    pub backend: Arc<Backend>,
    pub index: usize,
}

/// Trait for selection policies
///
/// Implementations are consulted once per forwarding attempt from many
/// concurrent contexts and must be thread-safe. The healthy set is the
/// snapshot current at call time; cursors are interpreted against it, never
/// against absolute pool positions.
pub trait SelectionPolicy: Send + Sync {
    /// Select the next backend from the healthy set.
    fn next_server(&self, healthy: &HealthySet) -> SteerResult<Selection>;

    /// Get the policy name.
    fn name(&self) -> &'static str;
}

/// Build the configured selection policy. Construction is one-shot; there is
/// no dynamic policy swap.
pub fn build_policy(kind: LoadBalancingType) -> Box<dyn SelectionPolicy> {
    match kind {
        LoadBalancingType::RoundRobin => Box::new(RoundRobinPolicy::new()),
        LoadBalancingType::WeightedRoundRobin => Box::new(WeightedRoundRobinPolicy::new()),
        LoadBalancingType::Random => Box::new(RandomPolicy::new()),
    }
}

/// Uniform random selection; successive calls are independent
#[derive(Debug, Default)]
pub struct RandomPolicy;

impl RandomPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionPolicy for RandomPolicy {
    fn next_server(&self, healthy: &HealthySet) -> SteerResult<Selection> {
        if healthy.is_empty() {
            return Err(SteerError::NoHealthyBackend);
        }

        use rand::Rng;
        let index = rand::thread_rng().gen_range(0..healthy.len());
        Ok(Selection {
            backend: Arc::clone(&healthy.backends()[index]),
            index,
        })
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Round-robin selection
///
/// The cursor is a free-running counter reduced modulo the healthy-set
/// length at each call, so a shrinking or growing set produces a smooth
/// transition instead of an out-of-range index.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    cursor: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl SelectionPolicy for RoundRobinPolicy {
    fn next_server(&self, healthy: &HealthySet) -> SteerResult<Selection> {
        if healthy.is_empty() {
            return Err(SteerError::NoHealthyBackend);
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Ok(Selection {
            backend: Arc::clone(&healthy.backends()[index]),
            index,
        })
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Weighted round-robin selection (smooth weighting)
///
/// Each call adds every backend's weight to its running score, picks the
/// highest score and subtracts the total weight from it. Over a stable
/// healthy set this schedules backend `i` exactly `w_i` times per window of
/// `sum(w)` selections, without bursting a heavy backend's turns together.
/// The state is keyed to the healthy-set generation and restarts from the
/// beginning of the ring when membership changes.
#[derive(Debug)]
pub struct WeightedRoundRobinPolicy {
    state: Mutex<WrrState>,
}

#[derive(Debug)]
struct WrrState {
    generation: u64,
    current_weights: Vec<i64>,
}

impl WeightedRoundRobinPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WrrState {
                generation: 0,
                current_weights: Vec::new(),
            }),
        }
    }
}

impl Default for WeightedRoundRobinPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionPolicy for WeightedRoundRobinPolicy {
    fn next_server(&self, healthy: &HealthySet) -> SteerResult<Selection> {
        if healthy.is_empty() {
            return Err(SteerError::NoHealthyBackend);
        }

        let backends = healthy.backends();
        let mut state = self.state.lock().expect("weighted state lock poisoned");

        if state.generation != healthy.generation()
            || state.current_weights.len() != backends.len()
        {
            state.generation = healthy.generation();
            state.current_weights = vec![0; backends.len()];
        }

        let total_weight: i64 = backends.iter().map(|b| i64::from(b.weight())).sum();

        let mut selected = 0;
        let mut max_weight = i64::MIN;
        for (i, backend) in backends.iter().enumerate() {
            state.current_weights[i] += i64::from(backend.weight());
            if state.current_weights[i] > max_weight {
                max_weight = state.current_weights[i];
                selected = i;
            }
        }

        state.current_weights[selected] -= total_weight;

        Ok(Selection {
            backend: Arc::clone(&backends[selected]),
            index: selected,
        })
    }

    fn name(&self) -> &'static str {
        "weighted-round-robin"
    }
}
