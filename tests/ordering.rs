//! Pins the load-bearing search orders: ancestor scans prefer more
//! informative sources, cascades clone from the candidate their canonical
//! scan finds, and events feed less informative combinations first.

use tracewarden::{
    AlgorithmKind, AutomatonDef, EventRecord, ParamBinding, ParamId, PropertyDef, WardenEngine,
};

fn ev(name: &str, bindings: &[(&str, u64)]) -> EventRecord {
    EventRecord::new(
        name,
        bindings
            .iter()
            .map(|&(ptype, id)| ParamBinding::always_live(ptype, ParamId::new(id)))
            .collect(),
    )
}

#[test]
fn ancestor_scan_takes_the_most_informative_monitored_source() {
    // Both {a-1} and {a-1, b-1} hold monitors when eabc arrives. Cloning
    // from the two-parameter ancestor lands in "deep"; cloning from the
    // single-parameter one would land in "shallow".
    let def = PropertyDef::builder("AncestorOrder")
        .param_type("a")
        .param_type("b")
        .param_type("c")
        .event("ea", ["a"])
        .event("eab", ["a", "b"])
        .event("eabc", ["a", "b", "c"])
        .automaton(
            AutomatonDef::new("n0")
                .state("n1")
                .state("n2")
                .state("deep_end")
                .state("shallow_end")
                .transition("n0", "ea", "n1")
                .transition("n1", "eab", "n2")
                .transition("n2", "eabc", "deep_end")
                .transition("n1", "eabc", "shallow_end")
                .category("deep", ["deep_end"])
                .category("shallow", ["shallow_end"]),
        )
        .algorithm(AlgorithmKind::C)
        .build()
        .unwrap();

    let engine = WardenEngine::new();
    let id = engine.load(def).unwrap();
    let session = engine.session(id).unwrap();
    let deep = session.subscribe_category("deep", 4).unwrap();
    let shallow = session.subscribe_category("shallow", 4).unwrap();

    engine.observe(&ev("ea", &[("a", 1)]));
    engine.observe(&ev("eab", &[("a", 1), ("b", 1)]));
    engine.observe(&ev("eabc", &[("a", 1), ("b", 1), ("c", 1)]));

    assert!(deep.try_recv().is_some(), "clone must come from {{a, b}}");
    assert!(shallow.try_recv().is_none());
}

#[test]
fn cascade_clones_the_join_from_the_candidate_it_scanned() {
    // eac seeds {a-1, c-1}; the later ebc sighting starts {b-1, c-1} fresh
    // and cascades a join {a-1, b-1, c-1} cloned from the compatible
    // candidate found through the shared {c-1} sub-combination. The join
    // inherits the eac step and so completes "both" on the same event.
    let def = PropertyDef::builder("CascadeSource")
        .param_type("a")
        .param_type("b")
        .param_type("c")
        .event("eac", ["a", "c"])
        .event("ebc", ["b", "c"])
        .automaton(
            AutomatonDef::new("m0")
                .state("m1")
                .state("m2")
                .state("m3")
                .transition("m0", "eac", "m1")
                .transition("m1", "ebc", "m2")
                .transition("m0", "ebc", "m3")
                .category("both", ["m2"])
                .category("pair_started", ["m3"]),
        )
        .algorithm(AlgorithmKind::C)
        .build()
        .unwrap();

    let engine = WardenEngine::new();
    let id = engine.load(def).unwrap();
    let session = engine.session(id).unwrap();
    let verdicts = session.subscribe(8).unwrap();

    engine.observe(&ev("eac", &[("a", 1), ("c", 1)]));
    engine.observe(&ev("ebc", &[("b", 1), ("c", 1)]));

    // Feed order is ascending informativeness: the exact combination of
    // the event before the join it spawned.
    let first = verdicts.try_recv().expect("exact combination verdict");
    assert_eq!(first.category, "pair_started");
    assert_eq!(first.combination.len(), 2);

    let second = verdicts.try_recv().expect("join verdict");
    assert_eq!(second.category, "both");
    assert_eq!(second.combination.len(), 3);

    assert!(verdicts.try_recv().is_none());
    assert_eq!(session.stats().monitors_created(), 3);
}
