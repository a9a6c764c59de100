//! Coenable-guided collection end to end: monitors disappear exactly when
//! every path to a verdict needs a dead binding, and never cost a verdict
//! that live bindings could still produce.

use tracewarden::{
    AlgorithmKind, AutomatonDef, EventRecord, LivenessFlag, ParamBinding, ParamId, PropertyDef,
    WardenEngine,
};

/// connect(a) send(a,b)+ ack(b) reaches "delivered".
fn delivery_def() -> PropertyDef {
    PropertyDef::builder("Delivery")
        .param_type("a")
        .param_type("b")
        .event("connect", ["a"])
        .event("send", ["a", "b"])
        .event("ack", ["b"])
        .creation("connect")
        .automaton(
            AutomatonDef::new("idle")
                .state("ready")
                .state("inflight")
                .state("done")
                .transition("idle", "connect", "ready")
                .transition("ready", "send", "inflight")
                .transition("inflight", "send", "inflight")
                .transition("inflight", "ack", "done")
                .category("delivered", ["done"]),
        )
        .algorithm(AlgorithmKind::D)
        .build()
        .unwrap()
}

fn ev(name: &str, bindings: Vec<ParamBinding>) -> EventRecord {
    EventRecord::new(name, bindings)
}

fn live(ptype: &str, id: u64) -> ParamBinding {
    ParamBinding::always_live(ptype, ParamId::new(id))
}

#[test]
fn dead_binding_reclaims_the_monitor() {
    let engine = WardenEngine::new();
    let id = engine.load(delivery_def()).unwrap();
    let session = engine.session(id).unwrap();

    let b1 = LivenessFlag::new();
    engine.observe(&ev("connect", vec![live("a", 1)]));
    engine.observe(&ev(
        "send",
        vec![live("a", 1), ParamBinding::new("b", ParamId::new(1), b1.clone())],
    ));
    // Both bindings alive: delivery still reachable, monitor kept.
    assert_eq!(session.live_monitors(), 2);
    assert_eq!(session.stats().monitors_collected(), 0);

    b1.release();
    // Later sightings of b-1 poll the first registered handle, so an
    // always-live binding here does not resurrect the object.
    engine.observe(&ev("send", vec![live("a", 1), live("b", 1)]));

    assert_eq!(session.stats().monitors_collected(), 1);
    assert_eq!(session.live_monitors(), 1, "only {{a-1}} survives");
}

#[test]
fn collection_is_silent_for_dead_slices() {
    let engine = WardenEngine::new();
    let id = engine.load(delivery_def()).unwrap();
    let session = engine.session(id).unwrap();
    let delivered = session.subscribe_category("delivered", 8).unwrap();

    let b1 = LivenessFlag::new();
    engine.observe(&ev("connect", vec![live("a", 1)]));
    engine.observe(&ev(
        "send",
        vec![live("a", 1), ParamBinding::new("b", ParamId::new(1), b1.clone())],
    ));
    b1.release();
    engine.observe(&ev("send", vec![live("a", 1), live("b", 1)]));
    engine.observe(&ev("ack", vec![live("b", 1)]));

    // The collected slice stays gone: the late ack finds no monitor to
    // feed and produces no verdict.
    assert!(delivered.try_recv().is_none());
    assert_eq!(session.stats().events_processed(), 4);
    assert_eq!(session.stats().monitors_collected(), 1);
}

#[test]
fn live_bindings_deliver_before_any_collection() {
    let engine = WardenEngine::new();
    let id = engine.load(delivery_def()).unwrap();
    let session = engine.session(id).unwrap();
    let delivered = session.subscribe_category("delivered", 8).unwrap();

    engine.observe(&ev("connect", vec![live("a", 1)]));
    engine.observe(&ev("send", vec![live("a", 1), live("b", 1)]));
    engine.observe(&ev("send", vec![live("a", 1), live("b", 1)]));
    engine.observe(&ev("ack", vec![live("b", 1)]));

    let verdict = delivered.try_recv().expect("delivery must be reported");
    assert_eq!(verdict.category, "delivered");
    assert_eq!(verdict.combination.len(), 2);

    // Nothing left to report for the pair after the goal, so the sweep
    // right after dispatch reclaims it. The verdict above already left.
    assert_eq!(session.stats().monitors_collected(), 1);
    assert_eq!(session.live_monitors(), 1);
}

#[test]
fn failed_monitors_are_never_collected() {
    let engine = WardenEngine::new();
    let id = engine.load(delivery_def()).unwrap();
    let session = engine.session(id).unwrap();
    let failures = session.subscribe_category("fail", 8).unwrap();

    engine.observe(&ev("connect", vec![live("a", 1)]));
    engine.observe(&ev("connect", vec![live("a", 1)]));
    engine.observe(&ev("connect", vec![live("a", 1)]));

    // The second connect has no transition out of ready; the slice fails
    // sticky and keeps reporting fail, but is never reclaimed.
    assert!(failures.try_recv().is_some());
    assert!(failures.try_recv().is_some());
    assert!(failures.try_recv().is_none());
    assert_eq!(session.stats().monitors_collected(), 0);
    assert_eq!(session.live_monitors(), 1);
}
