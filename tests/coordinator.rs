// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use fractal_cache::{
    ColorScheme, Config, Coordinator, DirectoryStore, GenerateError, GenerationRequest, MemoryStore,
};
use num::Complex;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn config() -> Config {
    Config {
        render_timeout: None,
        threads: 2,
        ..Config::default()
    }
}

fn scenario() -> GenerationRequest {
    GenerationRequest {
        width: 100,
        height: 100,
        max_iterations: 50,
        power: 2.0,
        c: Complex::new(0.285, 0.01),
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
        color_scheme: ColorScheme::Rainbow,
    }
}

// Every point of this viewport is inside the filled Julia set of
// z^2, so every pixel costs the full iteration cap.
fn heavy() -> GenerationRequest {
    GenerationRequest {
        width: 4000,
        height: 4000,
        max_iterations: 1000,
        c: Complex::new(0.0, 0.0),
        scale: 0.5,
        ..scenario()
    }
}

fn wait_until_rendering<S: fractal_cache::ArtifactStore>(coordinator: &Coordinator<S>) {
    let give_up = Instant::now() + Duration::from_secs(30);
    while coordinator.active_renders() == 0 {
        assert!(Instant::now() < give_up, "render never started");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn concurrent_identical_requests_render_once() {
    let coordinator = Arc::new(Coordinator::new(MemoryStore::new(), config()));
    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let coordinator = coordinator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                coordinator.get_or_generate(&scenario(), None)
            })
        })
        .collect();
    let artifacts: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert_eq!(coordinator.stats().renders, 1);
    for artifact in &artifacts[1..] {
        assert_eq!(artifact.fingerprint, artifacts[0].fingerprint);
        assert_eq!(&*artifact.png, &*artifacts[0].png);
    }
    let stats = coordinator.stats();
    assert_eq!(stats.cache_hits + stats.shared, callers as u64 - 1);
}

#[test]
fn two_concurrent_scenario_requests_share_one_render() {
    let coordinator = Arc::new(Coordinator::new(MemoryStore::new(), config()));
    let events = coordinator.subscribe();
    let other = coordinator.clone();
    let first = thread::spawn(move || other.get_or_generate(&scenario(), None));
    let second = coordinator.get_or_generate(&scenario(), None).unwrap();
    let first = first.join().unwrap().unwrap();

    assert_eq!(first.fingerprint.to_hex(), second.fingerprint.to_hex());
    assert_eq!(&*first.png, &*second.png);
    assert_eq!(coordinator.stats().renders, 1);
    assert!(events.recv_timeout(Duration::from_secs(5)).is_ok());
    assert!(events.try_recv().is_err());
}

#[test]
fn cancel_stops_a_large_render_promptly() {
    let coordinator = Arc::new(Coordinator::new(MemoryStore::new(), config()));
    let worker = coordinator.clone();
    let render = thread::spawn(move || worker.get_or_generate(&heavy(), None));
    wait_until_rendering(&coordinator);

    let cancelled_at = Instant::now();
    assert!(coordinator.cancel());
    let outcome = render.join().unwrap();
    assert_eq!(outcome, Err(GenerateError::Cancelled));
    assert!(cancelled_at.elapsed() < Duration::from_secs(30));
    assert_eq!(coordinator.active_renders(), 0);
    assert!(coordinator.store().is_empty());
    assert_eq!(coordinator.stats().cancelled, 1);

    // The gate is open again.
    assert!(coordinator.get_or_generate(&scenario(), None).is_ok());
}

#[test]
fn other_requests_are_busy_while_one_renders() {
    let coordinator = Arc::new(Coordinator::new(MemoryStore::new(), config()));
    let worker = coordinator.clone();
    let render = thread::spawn(move || worker.get_or_generate(&heavy(), None));
    wait_until_rendering(&coordinator);

    let started = Instant::now();
    assert_eq!(coordinator.get_or_generate(&scenario(), None), Err(GenerateError::Busy));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(coordinator.stats().busy, 1);

    coordinator.cancel();
    assert_eq!(render.join().unwrap(), Err(GenerateError::Cancelled));
}

#[test]
fn waiters_share_a_cancelled_outcome() {
    let coordinator = Arc::new(Coordinator::new(MemoryStore::new(), config()));
    let owner = coordinator.clone();
    let owner = thread::spawn(move || owner.get_or_generate(&heavy(), None));
    wait_until_rendering(&coordinator);

    let waiter = coordinator.clone();
    let waiter = thread::spawn(move || waiter.get_or_generate(&heavy(), None));
    let give_up = Instant::now() + Duration::from_secs(30);
    while coordinator.stats().shared == 0 {
        assert!(Instant::now() < give_up, "waiter never joined");
        thread::sleep(Duration::from_millis(5));
    }

    assert!(coordinator.cancel_fingerprint(&fractal_cache::Fingerprint::of(&heavy())));
    assert_eq!(owner.join().unwrap(), Err(GenerateError::Cancelled));
    assert_eq!(waiter.join().unwrap(), Err(GenerateError::Cancelled));
    assert_eq!(coordinator.stats().renders, 1);
}

#[test]
fn deadlines_time_out_and_free_the_gate() {
    let coordinator = Coordinator::new(MemoryStore::new(), config());
    let deadline = Instant::now() + Duration::from_millis(100);
    assert_eq!(
        coordinator.get_or_generate(&heavy(), Some(deadline)),
        Err(GenerateError::TimedOut)
    );
    assert_eq!(coordinator.active_renders(), 0);
    assert_eq!(coordinator.stats().timed_out, 1);
    assert!(coordinator.store().is_empty());
}

#[test]
fn configured_timeout_applies_without_a_deadline() {
    let coordinator = Coordinator::new(
        MemoryStore::new(),
        Config {
            render_timeout: Some(Duration::from_millis(50)),
            ..config()
        },
    );
    assert_eq!(coordinator.get_or_generate(&heavy(), None), Err(GenerateError::TimedOut));
}

#[test]
fn eviction_is_refused_while_rendering() {
    let coordinator = Arc::new(Coordinator::new(MemoryStore::new(), config()));
    let worker = coordinator.clone();
    let render = thread::spawn(move || worker.get_or_generate(&heavy(), None));
    wait_until_rendering(&coordinator);

    let fingerprint = fractal_cache::Fingerprint::of(&heavy());
    assert!(coordinator.is_in_flight(&fingerprint));
    assert_eq!(coordinator.evict(&fingerprint), Err(GenerateError::InFlight));

    coordinator.cancel();
    assert_eq!(render.join().unwrap(), Err(GenerateError::Cancelled));
    assert_eq!(coordinator.evict(&fingerprint), Ok(false));
}

#[test]
fn a_wider_gate_admits_distinct_renders() {
    let coordinator = Coordinator::new(
        MemoryStore::new(),
        Config {
            max_active_renders: 2,
            ..config()
        },
    );
    let coordinator = Arc::new(coordinator);
    let worker = coordinator.clone();
    let render = thread::spawn(move || worker.get_or_generate(&heavy(), None));
    wait_until_rendering(&coordinator);

    assert!(coordinator.get_or_generate(&scenario(), None).is_ok());
    coordinator.cancel();
    assert_eq!(render.join().unwrap(), Err(GenerateError::Cancelled));
}

#[test]
fn directory_stores_serve_later_coordinators() {
    let dir = tempfile::tempdir().unwrap();
    let first = Coordinator::new(DirectoryStore::open(dir.path()).unwrap(), config());
    let rendered = first.get_or_generate(&scenario(), None).unwrap();
    assert!(dir.path().join(rendered.file_name()).exists());

    let second = Coordinator::new(DirectoryStore::open(dir.path()).unwrap(), config());
    let cached = second.get_or_generate(&scenario(), None).unwrap();
    assert_eq!(cached, rendered);
    assert_eq!(second.stats().renders, 0);
    assert_eq!(second.stats().cache_hits, 1);
}
