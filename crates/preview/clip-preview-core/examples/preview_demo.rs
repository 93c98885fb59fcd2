use std::thread;
use std::time::{Duration, Instant};

use clip_preview::{
    AnimatorGraph, Clip, ClipId, ControllerRef, GraphId, LifecycleHub, MemoryGraph, MemoryHost,
    MemoryRig, PreviewConfig, PreviewSession, RigId, TickReport,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "clip_preview=debug".to_string()),
        )
        .init();

    // One rig driven directly by a two-layer graph.
    let mut host = MemoryHost::new();
    host.insert_graph(
        GraphId(1),
        MemoryGraph::with_layers(&["Base Layer", "Upper Body"]),
    );
    host.insert_rig(
        RigId(1),
        MemoryRig::new("Hero", ControllerRef::Graph(GraphId(1))),
    );
    let clip = Clip::new(ClipId(7), "Wave", 24.0, 2.5);

    let hub = LifecycleHub::new();
    let mut session = PreviewSession::new(PreviewConfig::default(), hub.clone())?;
    session.start_session(&mut host, Some(&clip), Some(RigId(1)))?;
    println!("layers while previewing: {:?}", layers(&host));

    // Scrub a few frames.
    for frame in [0, 15, 30, 59] {
        session.scrub_frame(&mut host, frame, &clip);
    }

    // Play, pausing once a quarter of the way through.
    session.play(&mut host);
    let mut last = Instant::now();
    let mut paused_for = 0;
    loop {
        thread::sleep(Duration::from_millis(4));
        let now = Instant::now();
        let report = session.tick(&mut host, now - last)?;
        last = now;

        if session.cursor().is_some_and(|c| c >= 0.25) && paused_for == 0 {
            session.pause();
            paused_for = 1;
        } else if paused_for > 0 && paused_for < 10 {
            paused_for += 1;
            if paused_for == 10 {
                session.resume();
            }
        }
        if matches!(
            report,
            TickReport::Finished { .. } | TickReport::Cancelled { .. }
        ) {
            break;
        }
    }

    for event in session.drain_events() {
        println!("{}", serde_json::to_string(&event)?);
    }

    session.end_session(&mut host)?;
    println!("layers after teardown: {:?}", layers(&host));
    Ok(())
}

fn layers(host: &MemoryHost) -> (usize, Vec<String>) {
    host.memory_graph(GraphId(1))
        .map(|g| {
            (
                g.layer_count(),
                g.layer_names().into_iter().map(String::from).collect(),
            )
        })
        .unwrap_or_default()
}
