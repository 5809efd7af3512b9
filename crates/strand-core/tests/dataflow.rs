//! End-to-end dataflow through source, node, and sink runnables.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use strand_core::edge::make_edge;
use strand_core::node::{LambdaSink, LambdaSource, ProcessingNode, WritableEntrypoint};
use strand_core::runnable::{EngineFactory, LaunchOptions};

#[test]
fn doubler_pipeline_counts_and_values() {
    let source = Arc::new(LambdaSource::new(|ctx| {
        for x in [1.0f64, 2.0, 3.0] {
            if ctx.emit(x).is_err() {
                break;
            }
        }
        Ok(())
    }));
    let node = Arc::new(ProcessingNode::new(|x: f64| x * 2.0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        Arc::new(LambdaSink::new(move |x: f64| seen.lock().push(x)))
    };

    make_edge(source.as_ref(), node.as_ref()).unwrap();
    make_edge(node.as_ref(), sink.as_ref()).unwrap();

    let factory = EngineFactory::new();
    let runners = [
        factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::clone(&source) as Arc<dyn strand_core::runnable::Runnable>)
            .unwrap(),
        factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::clone(&node) as Arc<dyn strand_core::runnable::Runnable>)
            .unwrap(),
        factory
            .launcher(LaunchOptions::default())
            .ignite(Arc::clone(&sink) as Arc<dyn strand_core::runnable::Runnable>)
            .unwrap(),
    ];
    for runner in &runners {
        runner.await_join().unwrap();
    }

    assert_eq!(*seen.lock(), vec![2.0, 4.0, 6.0]);
    assert_eq!(source.emitted(), 3);
    assert_eq!(node.processed(), 6);
    assert_eq!(sink.received(), 3);
}

#[test]
fn stop_drains_everything_enqueued_before_closure() {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let received = Arc::clone(&received);
        Arc::new(LambdaSink::new(move |x: u64| received.lock().push(x)))
    };
    let entry = WritableEntrypoint::new();
    make_edge(&entry, sink.as_ref()).unwrap();

    let factory = EngineFactory::new();
    let runner = factory
        .launcher(LaunchOptions::default())
        .ignite(Arc::clone(&sink) as Arc<dyn strand_core::runnable::Runnable>)
        .unwrap();

    // Stop early: the token stays untouched, so everything written before
    // the upstream closes is still observed.
    runner.stop();
    for i in 0..100u64 {
        entry.await_write(i).unwrap();
    }
    entry.finish();
    runner.await_join().unwrap();

    assert_eq!(received.lock().len(), 100);
    assert_eq!(sink.received(), 100);
}

#[test]
fn kill_during_steady_state_quiesces_the_sink_within_bounds() {
    const ITEMS: u64 = 1_000_000;

    let source = Arc::new(LambdaSource::new(|ctx| {
        for i in 0..ITEMS {
            if ctx.finish_requested() || ctx.emit(i).is_err() {
                break;
            }
        }
        Ok(())
    }));
    let last_received = Arc::new(Mutex::new(Instant::now()));
    let sink = {
        let last_received = Arc::clone(&last_received);
        Arc::new(LambdaSink::new(move |_: u64| {
            *last_received.lock() = Instant::now();
        }))
    };
    make_edge(source.as_ref(), sink.as_ref()).unwrap();

    let factory = EngineFactory::new();
    let source_runner = factory
        .launcher(LaunchOptions::default())
        .ignite(Arc::clone(&source) as Arc<dyn strand_core::runnable::Runnable>)
        .unwrap();
    let sink_runner = factory
        .launcher(LaunchOptions::default())
        .ignite(Arc::clone(&sink) as Arc<dyn strand_core::runnable::Runnable>)
        .unwrap();

    // Kill at t = 50ms, with the stream still in full flight.
    std::thread::sleep(Duration::from_millis(50));
    assert!(sink.received() > 0);
    assert!(sink.received() < ITEMS);

    let killed_at = Instant::now();
    sink_runner.kill();
    source_runner.kill();
    sink_runner.await_join().unwrap();
    source_runner.await_join().unwrap();

    // The sink stops receiving within 10ms of the kill request; whatever
    // was still queued is dropped on the floor, and neither side raised
    // an error beyond the closure statuses of the killed pipeline.
    let settled = *last_received.lock();
    assert!(settled.saturating_duration_since(killed_at) < Duration::from_millis(10));
    assert!(sink.received() < ITEMS);
}

#[test]
fn concurrent_source_engines_reach_one_sink() {
    let source = Arc::new(LambdaSource::new(|ctx| {
        let id = ctx.engine_id();
        ctx.emit(id).ok();
        Ok(())
    }));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        Arc::new(LambdaSink::new(move |id: u64| seen.lock().push(id)))
    };
    make_edge(source.as_ref(), sink.as_ref()).unwrap();

    let factory = EngineFactory::new();
    let source_runner = factory
        .launcher(LaunchOptions::with_pe_count(2).engines_per_pe(2))
        .ignite(Arc::clone(&source) as Arc<dyn strand_core::runnable::Runnable>)
        .unwrap();
    let sink_runner = factory
        .launcher(LaunchOptions::default())
        .ignite(Arc::clone(&sink) as Arc<dyn strand_core::runnable::Runnable>)
        .unwrap();

    source_runner.await_join().unwrap();
    sink_runner.await_join().unwrap();

    let mut ids = seen.lock().clone();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}
