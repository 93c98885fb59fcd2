use std::time::Duration;

use anyhow::Result;
use clip_preview::{
    AnimatorGraph, CancelReason, GraphId, HostSignal, InjectOutcome, LayerDesc, LifecycleHub,
    MemoryHost, PreviewConfig, PreviewEvent, PreviewSession, RemoveOutcome, RigCall, RigId,
    SkipReason, TickReport,
};
use clip_preview_test_fixtures::{clips, scenes};

fn init_tracing() {
    let default_filter = "clip_preview=debug";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn layer_count(host: &MemoryHost, graph: u32) -> usize {
    host.memory_graph(GraphId(graph))
        .expect("graph present")
        .layer_count()
}

fn push_foreign(host: &mut MemoryHost, graph: u32, name: &str) {
    host.memory_graph_mut(GraphId(graph))
        .expect("graph present")
        .add_layer(LayerDesc {
            name: name.into(),
            weight: 1.0,
        });
}

fn new_session(hub: &LifecycleHub) -> PreviewSession {
    PreviewSession::new(PreviewConfig::default(), hub.clone()).expect("default config is valid")
}

#[test]
fn start_then_end_restores_layer_count() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let hub = LifecycleHub::new();
    let mut session = new_session(&hub);

    assert_eq!(layer_count(&host, 1), 1);
    let outcome = session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    assert_eq!(
        outcome,
        InjectOutcome::Injected {
            graph: GraphId(1),
            layer: 1
        }
    );
    assert_eq!(layer_count(&host, 1), 2);
    assert!(session.is_active(&host));

    let graph = host.memory_graph(GraphId(1)).unwrap();
    let scratch = &graph.layers[1];
    assert_eq!(scratch.name, "AnimationViewer Layer");
    assert_eq!(scratch.weight, 1.0);
    assert_eq!(scratch.states.len(), 1);
    let state = scratch.default_state.expect("scratch state is default");
    assert_eq!(scratch.states[0].id, state);
    assert_eq!(scratch.states[0].name, "AnimationViewer State");
    assert_eq!(graph.state_motion(state), Some(walk.id));

    let outcome = session.end_session(&mut host)?;
    assert_eq!(outcome, RemoveOutcome::Removed { graph: GraphId(1) });
    assert_eq!(layer_count(&host, 1), 1);
    assert!(!session.is_active(&host));
    assert_eq!(session.target(), None);
    Ok(())
}

#[test]
fn end_session_twice_is_idempotent() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let hub = LifecycleHub::new();
    let mut session = new_session(&hub);

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    session.end_session(&mut host)?;
    let names_after_first: Vec<String> = host
        .memory_graph(GraphId(1))
        .unwrap()
        .layer_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    assert_eq!(session.end_session(&mut host)?, RemoveOutcome::NotActive);
    assert_eq!(
        host.memory_graph(GraphId(1)).unwrap().layer_names(),
        names_after_first
    );

    let ended = session
        .drain_events()
        .into_iter()
        .filter(|e| *e == PreviewEvent::SessionEnded)
        .count();
    assert_eq!(ended, 1);
    Ok(())
}

#[test]
fn repeated_start_reuses_scratch_layer() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let wave = clips::load("wave")?;
    let hub = LifecycleHub::new();
    let mut session = new_session(&hub);

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    let outcome = session.start_session(&mut host, Some(&wave), Some(RigId(1)))?;
    assert_eq!(
        outcome,
        InjectOutcome::Reused {
            graph: GraphId(1),
            layer: 1
        }
    );
    assert_eq!(layer_count(&host, 1), 2);

    let graph = host.memory_graph(GraphId(1)).unwrap();
    let state = graph.default_state(1).unwrap();
    assert_eq!(graph.state_motion(state), Some(wave.id));
    assert_eq!(session.injector().scratch_state(), Some(state));

    // Registered once even though start ran twice.
    assert_eq!(hub.subscriber_count(), 1);
    assert_eq!(
        session.drain_events(),
        vec![
            PreviewEvent::SessionStarted {
                graph: GraphId(1),
                clip: walk.id
            },
            PreviewEvent::ClipRebound { clip: wave.id },
        ]
    );

    session.end_session(&mut host)?;
    assert_eq!(layer_count(&host, 1), 1);
    assert_eq!(hub.subscriber_count(), 0);
    Ok(())
}

#[test]
fn rebinding_snaps_the_rig_pose() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let wave = clips::load("wave")?;
    let mut session = new_session(&LifecycleHub::new());

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    host.take_calls(RigId(1));
    session.start_session(&mut host, Some(&wave), Some(RigId(1)))?;
    assert_eq!(
        host.take_calls(RigId(1)),
        vec![RigCall::Update(0.0)]
    );
    Ok(())
}

#[test]
fn override_controller_mutates_base_graph() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("override-rig")?;
    let walk = clips::load("walk")?;
    let mut session = new_session(&LifecycleHub::new());

    let outcome = session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    assert_eq!(
        outcome,
        InjectOutcome::Injected {
            graph: GraphId(1),
            layer: 2
        }
    );
    assert_eq!(session.injector().baseline_layer_count(), 2);

    assert!(session.scrub(&mut host, 0.25));
    let head = &host.memory_rig(RigId(1)).unwrap().head;
    assert_eq!(head.layer, 2);

    session.end_session(&mut host)?;
    assert_eq!(
        host.memory_graph(GraphId(1)).unwrap().layer_names(),
        vec!["Base Layer", "Upper Body"]
    );
    Ok(())
}

#[test]
fn unresolvable_controllers_are_skipped() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("nested-override")?;
    let walk = clips::load("walk")?;
    let hub = LifecycleHub::new();
    let mut session = new_session(&hub);

    let nested = session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    assert_eq!(nested, InjectOutcome::Skipped(SkipReason::GraphUnresolved));
    let unassigned = session.start_session(&mut host, Some(&walk), Some(RigId(2)))?;
    assert_eq!(unassigned, InjectOutcome::Skipped(SkipReason::GraphUnresolved));

    assert_eq!(layer_count(&host, 1), 1);
    assert_eq!(hub.subscriber_count(), 0);
    assert!(session.drain_events().is_empty());
    Ok(())
}

#[test]
fn foreign_top_layer_blocks_teardown() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let hub = LifecycleHub::new();
    let mut session = new_session(&hub);

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    session.drain_events();
    push_foreign(&mut host, 1, "Added Elsewhere");

    let outcome = session.end_session(&mut host)?;
    assert_eq!(
        outcome,
        RemoveOutcome::ForeignLayer {
            found: "Added Elsewhere".into()
        }
    );
    assert_eq!(layer_count(&host, 1), 3);
    assert!(session.is_guarded());
    assert!(session.drain_events().is_empty());

    // Once the other actor is gone the same call succeeds.
    host.memory_graph_mut(GraphId(1)).unwrap().remove_layer(2)?;
    assert_eq!(
        session.end_session(&mut host)?,
        RemoveOutcome::Removed { graph: GraphId(1) }
    );
    assert_eq!(layer_count(&host, 1), 1);
    assert_eq!(hub.subscriber_count(), 0);
    Ok(())
}

#[test]
fn teardown_resets_rig_speed_and_snaps() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let mut session = new_session(&LifecycleHub::new());

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    session.scrub(&mut host, 0.4);
    assert_eq!(host.memory_rig(RigId(1)).unwrap().speed, 0.0);
    host.take_calls(RigId(1));

    session.end_session(&mut host)?;
    assert_eq!(
        host.take_calls(RigId(1)),
        vec![
            RigCall::SetSpeed(1.0),
            RigCall::Update(0.0)
        ]
    );
    Ok(())
}

#[test]
fn destroyed_rig_still_gets_graph_restored() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let mut session = new_session(&LifecycleHub::new());

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    host.invalidate_rig(RigId(1));
    host.take_calls(RigId(1));

    assert_eq!(
        session.end_session(&mut host)?,
        RemoveOutcome::Removed { graph: GraphId(1) }
    );
    assert_eq!(layer_count(&host, 1), 1);
    assert!(host.take_calls(RigId(1)).is_empty());
    Ok(())
}

#[test]
fn lifecycle_signals_end_the_session() -> Result<()> {
    init_tracing();
    let walk = clips::load("walk")?;
    for signal in [HostSignal::EnteringRunMode, HostSignal::Quitting] {
        let mut host = scenes::host("single-layer")?;
        let hub = LifecycleHub::new();
        let mut session = new_session(&hub);
        session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;

        hub.broadcast(signal);
        assert_eq!(session.pump_signals(&mut host)?, Some(signal));
        assert_eq!(layer_count(&host, 1), 1);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(session.drain_events().contains(&PreviewEvent::SessionEnded));

        // Nothing left to deliver.
        hub.broadcast(signal);
        assert_eq!(session.pump_signals(&mut host)?, None);
    }
    Ok(())
}

#[test]
fn sessions_on_separate_graphs_are_independent() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("two-rigs")?;
    let walk = clips::load("walk")?;
    let idle = clips::load("idle")?;
    let hub = LifecycleHub::new();
    let mut hero = new_session(&hub);
    let mut sidekick = new_session(&hub);
    assert_ne!(hero.id(), sidekick.id());

    hero.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    sidekick.start_session(&mut host, Some(&idle), Some(RigId(2)))?;
    assert_eq!(layer_count(&host, 1), 2);
    assert_eq!(layer_count(&host, 2), 3);
    assert_eq!(hub.subscriber_count(), 2);

    hero.end_session(&mut host)?;
    assert_eq!(layer_count(&host, 1), 1);
    assert!(sidekick.is_active(&host));

    hub.broadcast(HostSignal::Quitting);
    sidekick.tick(&mut host, Duration::ZERO)?;
    assert_eq!(layer_count(&host, 2), 2);
    assert_eq!(hub.subscriber_count(), 0);
    Ok(())
}

#[test]
fn retargeting_restores_previous_graph() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("two-rigs")?;
    let walk = clips::load("walk")?;
    let mut session = new_session(&LifecycleHub::new());

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    let outcome = session.start_session(&mut host, Some(&walk), Some(RigId(2)))?;
    assert_eq!(
        outcome,
        InjectOutcome::Injected {
            graph: GraphId(2),
            layer: 2
        }
    );
    assert_eq!(layer_count(&host, 1), 1);
    assert_eq!(layer_count(&host, 2), 3);
    assert_eq!(session.target(), Some(RigId(2)));

    // A rig sharing graph 1 would reuse, not stack a second layer.
    session.end_session(&mut host)?;
    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    let shared = session.start_session(&mut host, Some(&walk), Some(RigId(3)))?;
    assert!(matches!(shared, InjectOutcome::Reused { .. }));
    assert_eq!(layer_count(&host, 1), 2);
    Ok(())
}

#[test]
fn concrete_scenario() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let clip_a = clips::load("walk")?;
    let mut session = new_session(&LifecycleHub::new());

    session.start_session(&mut host, Some(&clip_a), Some(RigId(1)))?;
    assert_eq!(layer_count(&host, 1), 2);
    let graph = host.memory_graph(GraphId(1)).unwrap();
    let state = graph.default_state(1).unwrap();
    assert_eq!(graph.state_motion(state), Some(clip_a.id));

    assert!(session.scrub(&mut host, 0.5));
    let rig = host.memory_rig(RigId(1)).unwrap();
    assert_eq!(rig.head.state.as_deref(), Some("AnimationViewer State"));
    assert_eq!(rig.head.normalized_time, 0.5);
    assert_eq!(rig.speed, 0.0);

    session.end_session(&mut host)?;
    assert_eq!(layer_count(&host, 1), 1);
    Ok(())
}

#[test]
fn restart_under_a_foreign_layer_rebinds_in_place() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("single-layer")?;
    let walk = clips::load("walk")?;
    let wave = clips::load("wave")?;
    let mut session = new_session(&LifecycleHub::new());

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    push_foreign(&mut host, 1, "Other");

    let outcome = session.start_session(&mut host, Some(&wave), Some(RigId(1)))?;
    assert_eq!(
        outcome,
        InjectOutcome::Reused {
            graph: GraphId(1),
            layer: 1
        }
    );
    let graph = host.memory_graph(GraphId(1)).unwrap();
    assert_eq!(
        graph.layer_names(),
        vec!["Base Layer", "AnimationViewer Layer", "Other"]
    );
    let state = graph.default_state(1).unwrap();
    assert_eq!(graph.state_motion(state), Some(wave.id));

    assert!(matches!(
        session.end_session(&mut host)?,
        RemoveOutcome::ForeignLayer { .. }
    ));
    host.memory_graph_mut(GraphId(1)).unwrap().remove_layer(2)?;
    assert_eq!(
        session.end_session(&mut host)?,
        RemoveOutcome::Removed { graph: GraphId(1) }
    );
    assert_eq!(
        host.memory_graph(GraphId(1)).unwrap().layer_names(),
        vec!["Base Layer"]
    );
    Ok(())
}

#[test]
fn retarget_onto_leftover_region_stops_playback() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("two-rigs")?;
    let walk = clips::load("walk")?;
    let hub = LifecycleHub::new();

    // An earlier panel went away without tearing down graph 2.
    let mut stale = new_session(&hub);
    stale.start_session(&mut host, Some(&walk), Some(RigId(2)))?;
    drop(stale);
    assert_eq!(layer_count(&host, 2), 3);

    let mut session = new_session(&hub);
    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    let run = session.play(&mut host).expect("session is active");
    session.tick(&mut host, Duration::from_millis(10))?;
    session.drain_events();

    let outcome = session.start_session(&mut host, Some(&walk), Some(RigId(2)))?;
    assert_eq!(
        outcome,
        InjectOutcome::Reused {
            graph: GraphId(2),
            layer: 2
        }
    );
    assert_eq!(layer_count(&host, 1), 1);
    assert_eq!(session.active_run(), None);
    let events = session.drain_events();
    assert!(events.contains(&PreviewEvent::PlaybackCancelled {
        run,
        reason: CancelReason::Requested
    }));
    assert!(events.contains(&PreviewEvent::SessionEnded));

    host.take_calls(RigId(1));
    assert_eq!(
        session.tick(&mut host, Duration::from_millis(10))?,
        TickReport::Idle
    );
    assert!(host.take_calls(RigId(1)).is_empty());
    assert_eq!(hub.subscriber_count(), 1);
    Ok(())
}

#[test]
fn blocked_retarget_keeps_the_current_session() -> Result<()> {
    init_tracing();
    let mut host = scenes::host("two-rigs")?;
    let walk = clips::load("walk")?;
    let hub = LifecycleHub::new();
    let mut session = new_session(&hub);

    session.start_session(&mut host, Some(&walk), Some(RigId(1)))?;
    push_foreign(&mut host, 1, "Added Elsewhere");

    let outcome = session.start_session(&mut host, Some(&walk), Some(RigId(2)))?;
    assert_eq!(outcome, InjectOutcome::Skipped(SkipReason::ForeignLayer));
    assert_eq!(layer_count(&host, 2), 2);
    assert_eq!(session.injector().graph(), Some(GraphId(1)));
    assert_eq!(session.target(), Some(RigId(1)));
    assert_eq!(hub.subscriber_count(), 1);

    host.memory_graph_mut(GraphId(1)).unwrap().remove_layer(2)?;
    assert_eq!(
        session.end_session(&mut host)?,
        RemoveOutcome::Removed { graph: GraphId(1) }
    );
    assert_eq!(layer_count(&host, 1), 1);
    Ok(())
}
