use std::sync::{Arc, Mutex};

use pigpen::config::Settings;
use pigpen::driver::MockBackend;
use pigpen::graph::GraphError;
use pigpen::osc::commands::dispatch;
use pigpen::osc::CommandError;
use pigpen::{Engine, SharedBackend};

fn test_engine() -> Engine {
    let driver: SharedBackend = Arc::new(Mutex::new(MockBackend::new()));
    Engine::new(Settings::default(), driver)
}

fn tokens(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_create_and_query_operators() {
    let engine = test_engine();
    let created = dispatch(&engine, "new-operator", &tokens(&["Monitor", "foo"])).unwrap();
    assert_eq!(created, vec!["foo"]);

    let listed = dispatch(&engine, "q-operators", &tokens(&[])).unwrap();
    assert!(listed.contains(&"Monitor, foo".to_string()));
}

#[test]
fn test_name_collision_appends_suffix() {
    let engine = test_engine();
    dispatch(&engine, "new-operator", &tokens(&["Monitor", "foo"])).unwrap();
    let second = dispatch(&engine, "new-operator", &tokens(&["Monitor", "foo"])).unwrap();
    assert_eq!(second, vec!["foo.1"]);
    let third = dispatch(&engine, "new-operator", &tokens(&["Monitor", "foo"])).unwrap();
    assert_eq!(third, vec!["foo.2"]);
}

#[test]
fn test_connect_and_disconnect_symmetry() {
    let engine = test_engine();
    for name in ["a", "b"] {
        dispatch(&engine, "new-operator", &tokens(&["Monitor", name])).unwrap();
    }
    dispatch(&engine, "connect", &tokens(&["a", "b"])).unwrap();

    {
        let registry = engine.registry.lock().unwrap();
        let a = registry.get("a").unwrap();
        let b = registry.get("b").unwrap();
        assert!(a.lock().unwrap().has_child("b"));
        assert_eq!(b.lock().unwrap().parent_names(), vec!["a"]);
    }

    dispatch(&engine, "disconnect-child", &tokens(&["a", "b"])).unwrap();
    {
        let registry = engine.registry.lock().unwrap();
        let a = registry.get("a").unwrap();
        let b = registry.get("b").unwrap();
        assert!(!a.lock().unwrap().has_child("b"));
        assert!(b.lock().unwrap().is_root());
    }
}

#[test]
fn test_cycle_rejected_leaves_graph_unchanged() {
    let engine = test_engine();
    for name in ["a", "b", "c"] {
        dispatch(&engine, "new-operator", &tokens(&["Monitor", name])).unwrap();
    }
    dispatch(&engine, "connect", &tokens(&["a", "b"])).unwrap();
    dispatch(&engine, "connect", &tokens(&["b", "c"])).unwrap();

    let err = dispatch(&engine, "connect", &tokens(&["c", "a"])).unwrap_err();
    assert!(matches!(
        err,
        CommandError::Graph(GraphError::TreeDepthExceeded { .. })
    ));

    let registry = engine.registry.lock().unwrap();
    let a = registry.get("a").unwrap();
    assert!(a.lock().unwrap().is_root());
}

#[test]
fn test_depth_bound_rejects_thirteenth_level() {
    let engine = test_engine();
    for i in 0..13 {
        dispatch(&engine, "new-operator", &tokens(&["Monitor", &format!("op{}", i)])).unwrap();
    }
    // Chain op0 -> ... -> op11: twelve levels, exactly at the default bound.
    for i in 0..11 {
        dispatch(
            &engine,
            "connect",
            &tokens(&[&format!("op{}", i), &format!("op{}", i + 1)]),
        )
        .unwrap();
    }
    // A thirteenth level must be refused.
    let err = dispatch(&engine, "connect", &tokens(&["op11", "op12"])).unwrap_err();
    assert!(matches!(
        err,
        CommandError::Graph(GraphError::TreeDepthExceeded { .. })
    ));
}

#[test]
fn test_roots_query() {
    let engine = test_engine();
    for name in ["a", "b", "c"] {
        dispatch(&engine, "new-operator", &tokens(&["Monitor", name])).unwrap();
    }
    dispatch(&engine, "connect", &tokens(&["a", "b"])).unwrap();
    let roots = dispatch(&engine, "q-roots", &tokens(&[])).unwrap();
    assert_eq!(roots, vec!["a", "c"]);
}

#[test]
fn test_delete_operator_detaches_edges() {
    let engine = test_engine();
    for name in ["a", "b", "c"] {
        dispatch(&engine, "new-operator", &tokens(&["Monitor", name])).unwrap();
    }
    dispatch(&engine, "connect", &tokens(&["a", "b"])).unwrap();
    dispatch(&engine, "connect", &tokens(&["b", "c"])).unwrap();
    dispatch(&engine, "delete-operator", &tokens(&["b"])).unwrap();

    let registry = engine.registry.lock().unwrap();
    assert!(registry.get("b").is_err());
    let a = registry.get("a").unwrap();
    let c = registry.get("c").unwrap();
    assert!(a.lock().unwrap().child_names().is_empty());
    assert!(c.lock().unwrap().is_root());
}

#[test]
fn test_disconnect_all_and_parents() {
    let engine = test_engine();
    for name in ["top", "mid", "leaf", "other"] {
        dispatch(&engine, "new-operator", &tokens(&["Monitor", name])).unwrap();
    }
    dispatch(&engine, "connect", &tokens(&["top", "mid"])).unwrap();
    dispatch(&engine, "connect", &tokens(&["other", "mid"])).unwrap();
    dispatch(&engine, "connect", &tokens(&["mid", "leaf"])).unwrap();

    dispatch(&engine, "disconnect-all", &tokens(&["mid"])).unwrap();
    {
        let registry = engine.registry.lock().unwrap();
        let mid = registry.get("mid").unwrap();
        assert!(mid.lock().unwrap().child_names().is_empty());
        // Parent edges survive disconnect-all.
        assert_eq!(mid.lock().unwrap().parent_names().len(), 2);
    }

    dispatch(&engine, "disconnect-parents", &tokens(&["mid"])).unwrap();
    {
        let registry = engine.registry.lock().unwrap();
        let mid = registry.get("mid").unwrap();
        assert!(mid.lock().unwrap().is_root());
        let top = registry.get("top").unwrap();
        assert!(top.lock().unwrap().child_names().is_empty());
    }
}

#[test]
fn test_delete_all_clears_registry() {
    let engine = test_engine();
    for name in ["a", "b"] {
        dispatch(&engine, "new-operator", &tokens(&["Monitor", name])).unwrap();
    }
    dispatch(&engine, "delete-all-operators", &tokens(&[])).unwrap();
    assert!(engine.registry.lock().unwrap().is_empty());
}

#[test]
fn test_midi_device_operators_are_cached() {
    let engine = test_engine();
    let first = dispatch(&engine, "new-midi-output", &tokens(&["Output A", "synth"])).unwrap();
    let second = dispatch(&engine, "new-midi-output", &tokens(&["Output A", "other"])).unwrap();
    assert_eq!(first, second);

    let listed = dispatch(&engine, "q-operators", &tokens(&[])).unwrap();
    assert_eq!(
        listed.iter().filter(|l| l.starts_with("MIDIOutput")).count(),
        1
    );
}

#[test]
fn test_unknown_operator_errors() {
    let engine = test_engine();
    let err = dispatch(&engine, "delete-operator", &tokens(&["ghost"])).unwrap_err();
    assert!(matches!(err, CommandError::Graph(GraphError::NotFound(_))));

    let err = dispatch(&engine, "new-operator", &tokens(&["Mangler", "x"])).unwrap_err();
    assert!(matches!(
        err,
        CommandError::Graph(GraphError::UnknownOperatorType(_))
    ));
}
