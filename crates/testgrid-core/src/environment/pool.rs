//! The environment pool: predefined environments plus ones generated on demand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use testgrid_space::{CheckMode, Requirement};

use super::error::{PoolError, PoolResult};
use super::model::{Environment, EnvironmentSpec, ScheduleKey};
use crate::notifier::NotifierBus;

/// An environment shared between the pool and the worker processing it.
///
/// The worker holds the lock from deploy through delete, so teardown can
/// never overlap execution on the same environment.
pub type SharedEnvironment = Arc<Mutex<Environment>>;

#[derive(Default)]
struct PoolState {
    environments: Vec<SharedEnvironment>,
    /// Minimized-capability fingerprint -> generated environment.
    fingerprints: HashMap<String, SharedEnvironment>,
}

/// Holds every environment of one run, in insertion order.
pub struct EnvironmentPool {
    state: Mutex<PoolState>,
    next_id: AtomicU64,
    bus: Arc<NotifierBus>,
}

impl EnvironmentPool {
    /// Build a pool seeded with user-declared environments.
    pub fn load(predefined: Vec<EnvironmentSpec>, bus: Arc<NotifierBus>) -> PoolResult<Self> {
        let mut state = PoolState::default();
        let mut names = HashSet::new();
        let mut next_id = 0;
        for spec in predefined {
            let env = Environment::predefined(next_id, spec)?;
            next_id += 1;
            if !names.insert(env.name().to_string()) {
                return Err(PoolError::DuplicateName(env.name().to_string()));
            }
            debug!(environment = %env.name(), cost = env.cost(), "loaded predefined environment");
            state.environments.push(Arc::new(Mutex::new(env)));
        }
        Ok(Self {
            state: Mutex::new(state),
            next_id: AtomicU64::new(next_id),
            bus,
        })
    }

    pub fn bus(&self) -> &Arc<NotifierBus> {
        &self.bus
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.environments.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of the pool's handles in insertion order.
    pub async fn environments(&self) -> Vec<SharedEnvironment> {
        self.state.lock().await.environments.clone()
    }

    /// Find an environment able to host `requirement`, or generate one.
    ///
    /// Reuse is tried first by fingerprint of the minimized capability, then
    /// by checking every live, non-dedicated environment. With `force_new`
    /// a dedicated environment is always generated. Returns the handle and
    /// whether it was created by this call.
    pub async fn get_or_create(
        &self,
        requirement: &Requirement,
        force_new: bool,
        source_result: Option<&str>,
    ) -> PoolResult<(SharedEnvironment, bool)> {
        let minimum = requirement.minimum_capability();
        let mut state = self.state.lock().await;

        if !force_new {
            let fingerprint = minimum.fingerprint()?;
            if let Some(existing) = state.fingerprints.get(&fingerprint) {
                return Ok((Arc::clone(existing), false));
            }
            for handle in &state.environments {
                let env = handle.lock().await;
                if !env.status().is_alive() || env.is_dedicated() {
                    continue;
                }
                if requirement
                    .check_capability(&env.capability(), CheckMode::FirstFailure)
                    .result
                {
                    debug!(environment = %env.name(), "reusing environment for requirement");
                    return Ok((Arc::clone(handle), false));
                }
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let fingerprint = if force_new {
            None
        } else {
            Some(minimum.fingerprint()?)
        };
        let env = Environment::generated(
            id,
            minimum,
            source_result.map(str::to_string),
            force_new,
        );
        info!(
            environment = %env.name(),
            nodes = env.nodes().len(),
            cost = env.cost(),
            dedicated = force_new,
            "generated environment"
        );
        let handle = Arc::new(Mutex::new(env));
        if let Some(fingerprint) = fingerprint {
            state.fingerprints.insert(fingerprint, Arc::clone(&handle));
        }
        state.environments.push(Arc::clone(&handle));
        Ok((handle, true))
    }

    /// Handles in scheduling order: predefined before generated, then by
    /// ascending cost, ties kept in insertion order.
    pub async fn schedule_order(&self) -> Vec<SharedEnvironment> {
        let handles = self.environments().await;
        let mut keyed = Vec::with_capacity(handles.len());
        for handle in handles {
            let key = handle.lock().await.schedule_key();
            keyed.push((key, handle));
        }
        prioritize(keyed)
    }
}

/// Stable sort by [`ScheduleKey`].
pub fn prioritize<T>(mut keyed: Vec<(ScheduleKey, T)>) -> Vec<T> {
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, item)| item).collect()
}
