// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The generation coordinator: a fingerprint-keyed cache in front of
//! the renderer.
//!
//! Two independent gates are enforced, both under one mutex:
//!
//! 1. **At most `max_active_renders` renders process-wide** (one, by
//!    default).  This bounds the memory and CPU a burst of requests
//!    can claim.  A caller that would need a new render while the gate
//!    is full gets `GenerateError::Busy` immediately; it is never
//!    queued.
//!
//! 2. **At most one render per fingerprint.**  A caller asking for a
//!    fingerprint that is already rendering waits for that render and
//!    receives its outcome, success or failure, instead of starting a
//!    second one.
//!
//! Per fingerprint the life cycle is `Absent -> InFlight -> Completed`
//! or `Absent -> InFlight -> Absent` (cancelled or failed; a later
//! request may try again).  `Completed` means the artifact is in the
//! store, and it was put there before the in-flight entry was
//! retired, so any caller that sees no in-flight entry and finds the
//! artifact sees the whole artifact.
//!
//! Both gates are released on every way out of a render, including a
//! panic in the renderer or the store.

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::artifact::Artifact;
use crate::errors::GenerateError;
use crate::fingerprint::Fingerprint;
use crate::render::{CancelToken, Renderer};
use crate::request::GenerationRequest;
use crate::store::ArtifactStore;

/// Coordinator settings.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Size of the process-wide render gate.
    pub max_active_renders: usize,
    /// Deadline applied to callers that bring none.  `None` lets
    /// renders run until they finish or are cancelled.
    pub render_timeout: Option<Duration>,
    /// Row workers inside each render.
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_active_renders: 1,
            render_timeout: Some(Duration::from_secs(120)),
            threads: num_cpus::get(),
        }
    }
}

/// Published once for every freshly rendered and stored artifact.
/// Cache hits publish nothing.
#[derive(Clone, Debug)]
pub struct Completed {
    /// The new artifact.
    pub artifact: Artifact,
    /// Wall-clock time spent rendering and storing it.
    pub elapsed: Duration,
}

/// Counters since the coordinator was built.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Renders admitted through the gate.
    pub renders: u64,
    /// Requests answered from the store.
    pub cache_hits: u64,
    /// Requests that waited on someone else's render.
    pub shared: u64,
    /// Requests turned away because the gate was full.
    pub busy: u64,
    /// Renders that were cancelled.
    pub cancelled: u64,
    /// Renders that ran out of time.
    pub timed_out: u64,
    /// Renders that failed in the renderer or the store.
    pub failed: u64,
}

type Outcome = Result<Artifact, GenerateError>;

// One in-flight render.  `outcome` is only touched while the
// coordinator's state lock is held.
#[derive(Debug, Default)]
struct Flight {
    cancel: CancelToken,
    outcome: Mutex<Option<Outcome>>,
}

impl Flight {
    fn outcome(&self) -> Option<Outcome> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn settle(&self, outcome: Outcome) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }
}

#[derive(Default)]
struct State {
    active: usize,
    in_flight: HashMap<Fingerprint, Arc<Flight>>,
    subscribers: Vec<Sender<Completed>>,
    // Successful renders so far.
    published: u64,
    stats: Stats,
}

/// Hands out artifacts for requests, rendering each distinct request
/// at most once.  Build one per process and share it.
pub struct Coordinator<S> {
    store: S,
    renderer: Renderer,
    config: Config,
    state: Mutex<State>,
    settled: Condvar,
}

// Holds both gates for one render.  Dropping it without settling
// (a panic between admission and publication) releases them with a
// failure.
struct Admission<'a, S: ArtifactStore> {
    coordinator: &'a Coordinator<S>,
    fingerprint: Fingerprint,
    flight: Arc<Flight>,
    started: Instant,
    settled: bool,
}

impl<'a, S: ArtifactStore> Admission<'a, S> {
    fn settle(mut self, outcome: Outcome) -> Outcome {
        self.settled = true;
        self.coordinator
            .finish(&self.fingerprint, &self.flight, &outcome, self.started.elapsed());
        outcome
    }
}

impl<'a, S: ArtifactStore> Drop for Admission<'a, S> {
    fn drop(&mut self) {
        if !self.settled {
            let outcome = Err(GenerateError::RenderFailure(
                "render aborted by a panic".to_string(),
            ));
            self.coordinator
                .finish(&self.fingerprint, &self.flight, &outcome, self.started.elapsed());
        }
    }
}

impl<S: ArtifactStore> Coordinator<S> {
    /// A coordinator over `store`.
    pub fn new(store: S, config: Config) -> Coordinator<S> {
        Coordinator {
            store,
            renderer: Renderer::new(config.threads),
            config,
            state: Mutex::new(State::default()),
            settled: Condvar::new(),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // Nothing panics while holding the state lock except a store
    // removal, and that leaves the state as it was.
    fn lock(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the artifact for `request`, rendering it if nobody has
    /// yet.  `deadline` bounds both the render and any wait for
    /// another caller's render of the same request; without one the
    /// configured `render_timeout` applies.
    pub fn get_or_generate(
        &self,
        request: &GenerationRequest,
        deadline: Option<Instant>,
    ) -> Result<Artifact, GenerateError> {
        request.validate().map_err(GenerateError::InvalidRequest)?;
        let fingerprint = Fingerprint::of(request);
        let deadline =
            deadline.or_else(|| self.config.render_timeout.map(|timeout| Instant::now() + timeout));

        // The store is read without the state lock.  `published` tells
        // whether a render finished while it was being read, in which
        // case the miss may be stale and the store is read again.
        let admission = loop {
            let seen = {
                let state = self.lock();
                if let Some(flight) = state.in_flight.get(&fingerprint).cloned() {
                    return self.join(state, &fingerprint, &flight, deadline);
                }
                state.published
            };
            let cached = self.store.lookup(&fingerprint)?;

            let mut state = self.lock();
            if let Some(artifact) = cached {
                state.stats.cache_hits += 1;
                debug!("cache hit for {}", fingerprint);
                return Ok(artifact);
            }
            if let Some(flight) = state.in_flight.get(&fingerprint).cloned() {
                return self.join(state, &fingerprint, &flight, deadline);
            }
            if state.published != seen {
                continue;
            }
            if state.active >= self.config.max_active_renders {
                state.stats.busy += 1;
                warn!("turning away {}: {} render(s) active", fingerprint, state.active);
                return Err(GenerateError::Busy);
            }
            state.active += 1;
            state.stats.renders += 1;
            let flight = Arc::new(Flight::default());
            state.in_flight.insert(fingerprint, flight.clone());
            break Admission {
                coordinator: self,
                fingerprint,
                flight,
                started: Instant::now(),
                settled: false,
            };
        };

        info!("generating {}", fingerprint);
        let outcome = self
            .renderer
            .render(request, &admission.flight.cancel, deadline)
            .map_err(GenerateError::from)
            .and_then(|artifact| {
                self.store.store(&artifact)?;
                Ok(artifact)
            });
        admission.settle(outcome)
    }

    fn join(
        &self,
        mut state: MutexGuard<State>,
        fingerprint: &Fingerprint,
        flight: &Flight,
        deadline: Option<Instant>,
    ) -> Outcome {
        state.stats.shared += 1;
        debug!("{} is already rendering, waiting for it", fingerprint);
        self.wait_for(state, flight, deadline)
    }

    fn wait_for(
        &self,
        mut state: MutexGuard<State>,
        flight: &Flight,
        deadline: Option<Instant>,
    ) -> Outcome {
        loop {
            if let Some(outcome) = flight.outcome() {
                return outcome;
            }
            state = match deadline {
                None => self
                    .settled
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(GenerateError::TimedOut);
                    }
                    self.settled
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn finish(&self, fingerprint: &Fingerprint, flight: &Flight, outcome: &Outcome, elapsed: Duration) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        state.in_flight.remove(fingerprint);
        match outcome {
            Ok(artifact) => {
                state.published += 1;
                info!("generated {} in {:?}", fingerprint, elapsed);
                let event = Completed {
                    artifact: artifact.clone(),
                    elapsed,
                };
                state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
            }
            Err(GenerateError::Cancelled) => {
                state.stats.cancelled += 1;
                warn!("generation of {} cancelled after {:?}", fingerprint, elapsed);
            }
            Err(GenerateError::TimedOut) => {
                state.stats.timed_out += 1;
                warn!("generation of {} aborted due to time limit after {:?}", fingerprint, elapsed);
            }
            Err(err) => {
                state.stats.failed += 1;
                error!("generation of {} failed: {}", fingerprint, err);
            }
        }
        flight.settle(outcome.clone());
        drop(state);
        self.settled.notify_all();
    }

    /// Signal every active render to stop.  Returns whether there was
    /// one.
    pub fn cancel(&self) -> bool {
        let state = self.lock();
        for (fingerprint, flight) in state.in_flight.iter() {
            info!("cancelling {}", fingerprint);
            flight.cancel.cancel();
        }
        !state.in_flight.is_empty()
    }

    /// Signal the render of one fingerprint to stop, if it is running.
    pub fn cancel_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        match self.lock().in_flight.get(fingerprint) {
            Some(flight) => {
                info!("cancelling {}", fingerprint);
                flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// The stored artifact for `fingerprint`, without rendering.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, GenerateError> {
        Ok(self.store.lookup(fingerprint)?)
    }

    /// Remove a stored artifact on behalf of whoever deletes images.
    /// Refused with `InFlight` while the fingerprint is rendering.
    pub fn evict(&self, fingerprint: &Fingerprint) -> Result<bool, GenerateError> {
        let state = self.lock();
        if state.in_flight.contains_key(fingerprint) {
            return Err(GenerateError::InFlight);
        }
        let removed = self.store.remove(fingerprint)?;
        if removed {
            info!("evicted {}", fingerprint);
        }
        Ok(removed)
    }

    /// A channel that receives a `Completed` for every artifact
    /// rendered from now on.  Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<Completed> {
        let (tx, rx) = channel::unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Renders currently holding the process-wide gate.
    pub fn active_renders(&self) -> usize {
        self.lock().active
    }

    /// Whether `fingerprint` is rendering right now.
    pub fn is_in_flight(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().in_flight.contains_key(fingerprint)
    }

    /// A snapshot of the counters.
    pub fn stats(&self) -> Stats {
        self.lock().stats
    }
}
