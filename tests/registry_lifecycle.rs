use std::sync::Arc;

use corpsewarden::config::Config;
use corpsewarden::coordinator::ContextId;
use corpsewarden::error::ProxyError;
use corpsewarden::proxy::{ContextScoped, CorpseRegistry, Location, ParticipantId};

mod common;

#[test]
fn one_live_proxy_per_participant() {
    let backend = common::backend();
    let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
    let p = common::eliminated("Ada");

    corpses
        .create(&p, &common::spot("arena"), ContextId::from("arena"))
        .unwrap();
    let err = corpses
        .create(&p, &common::spot("arena"), ContextId::from("arena"))
        .unwrap_err();
    assert_eq!(err, ProxyError::DuplicateKey(p.id));
    assert_eq!(corpses.count(), 1);
    assert_eq!(backend.live_count(), 1);
}

#[test]
fn removal_is_idempotent() {
    let backend = common::backend();
    let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
    let p = common::eliminated("Ada");
    corpses
        .create(&p, &common::spot("arena"), ContextId::from("arena"))
        .unwrap();

    assert!(corpses.remove(&p.id));
    assert!(!corpses.remove(&p.id));
    assert_eq!(backend.release_count(), 1);
    // a fresh corpse is allowed once the old one is gone
    assert!(corpses
        .create(&p, &common::spot("arena"), ContextId::from("arena"))
        .is_ok());
}

#[test]
fn unresolvable_world_is_rejected() {
    let backend = common::backend();
    let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
    let p = common::eliminated("Ada");
    let mut nowhere = common::spot("arena");
    nowhere.world = None;
    let err = corpses
        .create(&p, &nowhere, ContextId::from("arena"))
        .unwrap_err();
    assert!(matches!(err, ProxyError::PlacementInvalid { .. }));
    assert_eq!(backend.spawned_total(), 0);
}

#[test]
fn bulk_removal_by_context() {
    let backend = common::backend();
    let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
    let mut in_a = Vec::new();
    for i in 0..3 {
        let p = common::eliminated(&format!("a{}", i));
        corpses
            .create(&p, &common::spot("a"), ContextId::from("A"))
            .unwrap();
        in_a.push(p.id);
    }
    for i in 0..2 {
        let p = common::eliminated(&format!("b{}", i));
        corpses
            .create(&p, &common::spot("b"), ContextId::from("B"))
            .unwrap();
    }

    let mut removed = corpses.remove_by_context(&ContextId::from("A"));
    removed.sort();
    in_a.sort();
    assert_eq!(removed, in_a);
    assert_eq!(corpses.count(), 2);
    assert_eq!(corpses.live_contexts(), vec![ContextId::from("B")]);
}

#[test]
fn release_failure_still_drops_the_entry() {
    let backend = common::backend();
    let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
    let p = common::eliminated("Ada");
    corpses
        .create(&p, &common::spot("arena"), ContextId::from("arena"))
        .unwrap();
    backend.fail_releases(true);

    assert!(corpses.remove(&p.id));
    assert!(!corpses.contains(&p.id));
    assert!(!corpses.remove(&p.id));
}

#[test]
fn teardown_releases_each_handle_exactly_once() {
    let backend = common::backend();
    let corpses = CorpseRegistry::new(Arc::clone(&backend), &Config::default());
    for i in 0..5 {
        let p = common::eliminated(&format!("p{}", i));
        let ctx = if i % 2 == 0 { "A" } else { "B" };
        corpses
            .create(&p, &common::spot(ctx), ContextId::from(ctx))
            .unwrap();
    }
    // one proxy is already gone before shutdown
    let first = corpses.snapshot()[0].key;
    corpses.remove(&first);

    assert_eq!(corpses.remove_all(), 4);
    assert_eq!(corpses.count(), 0);
    assert_eq!(backend.live_count(), 0);
    let calls = backend.release_calls();
    assert_eq!(calls.len(), 5);
    assert!(calls.values().all(|&n| n == 1), "{:?}", calls);
}

#[test]
fn concurrent_removers_release_once() {
    let backend = common::backend();
    let corpses = Arc::new(CorpseRegistry::new(Arc::clone(&backend), &Config::default()));
    let ids: Vec<ParticipantId> = (0..16)
        .map(|i| {
            let p = common::eliminated(&format!("p{}", i));
            corpses
                .create(&p, &Location::new("w", 0.0, 0.0, 0.0), ContextId::from("A"))
                .unwrap();
            p.id
        })
        .collect();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let corpses = Arc::clone(&corpses);
            let ids = ids.clone();
            std::thread::spawn(move || ids.iter().filter(|id| corpses.remove(id)).count())
        })
        .collect();
    let removed: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

    assert_eq!(removed, 16);
    assert_eq!(backend.release_count(), 16);
    assert!(backend.release_calls().values().all(|&n| n == 1));
}
