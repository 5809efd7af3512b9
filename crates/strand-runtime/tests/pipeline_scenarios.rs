//! Single-executor pipeline scenarios over the manifold layer.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use strand_core::node::{LambdaSink, LambdaSource, ProcessingNode};
use strand_core::runnable::LaunchOptions;

use strand_runtime::executor::EXIT_OK;
use strand_runtime::pipeline::{PipelineDefinition, SegmentAddress, SegmentAssignments};
use strand_runtime::transport::{LoopbackDataPlane, LoopbackFabric};
use strand_runtime::Executor;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stamped {
    id: u64,
    stamps: Vec<u64>,
}

fn now_millis() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock after epoch")
            .as_millis(),
    )
    .expect("fits for a very long time")
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    check()
}

/// Four segments in a chain, each stamping a timestamp on the record.
fn stamping_pipeline(items: u64, collected: Arc<Mutex<Vec<Stamped>>>) -> PipelineDefinition {
    let mut definition = PipelineDefinition::new("stamps");

    definition.add_segment("seg1", &[], &["p1"], move |seg| {
        let source = Arc::new(LambdaSource::new(move |ctx| {
            for id in 0..items {
                let record = Stamped {
                    id,
                    stamps: vec![now_millis()],
                };
                if ctx.emit(record).is_err() {
                    break;
                }
            }
            Ok(())
        }));
        seg.egress_port("p1", source.as_ref())?;
        seg.launch(LaunchOptions::default(), source);
        Ok(())
    });

    for (name, ingress, egress) in [("seg2", "p1", "p2"), ("seg3", "p2", "p3")] {
        definition.add_segment(name, &[ingress], &[egress], move |seg| {
            let node = Arc::new(ProcessingNode::new(|mut record: Stamped| {
                record.stamps.push(now_millis());
                record
            }));
            seg.ingress_port(ingress, node.as_ref())?;
            seg.egress_port(egress, node.as_ref())?;
            seg.launch(LaunchOptions::default(), node);
            Ok(())
        });
    }

    definition.add_segment("seg4", &["p3"], &[], move |seg| {
        let collected = Arc::clone(&collected);
        let sink = Arc::new(LambdaSink::new(move |mut record: Stamped| {
            record.stamps.push(now_millis());
            collected.lock().push(record);
        }));
        seg.ingress_port("p3", sink.as_ref())?;
        seg.launch(LaunchOptions::default(), sink);
        Ok(())
    });

    definition
}

#[test]
fn four_segment_chain_stamps_each_hop() {
    const ITEMS: u64 = 100;

    let collected = Arc::new(Mutex::new(Vec::new()));
    let fabric = LoopbackFabric::new();
    let executor = Executor::new(1, Arc::new(LoopbackDataPlane::attach(fabric, 1)));
    executor.register_pipeline(stamping_pipeline(ITEMS, Arc::clone(&collected)));
    executor.start().unwrap();

    let mut assignments = SegmentAssignments::default();
    for (rank, segment) in ["seg1", "seg2", "seg3", "seg4"].iter().enumerate() {
        assignments.insert(
            SegmentAddress::new(1, 0, u32::try_from(rank).unwrap()),
            (*segment).to_string(),
        );
    }
    executor.push_updates(&assignments).unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        collected.lock().len() == ITEMS as usize
    }));

    executor.stop();
    assert_eq!(executor.join(), EXIT_OK);

    let records = collected.lock();
    assert_eq!(records.len(), ITEMS as usize);

    // Every record carries exactly one stamp per hop: ingress, two
    // intermediate nodes, and the egress sink.
    let mut ids: Vec<u64> = records.iter().map(|r| r.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..ITEMS).collect::<Vec<u64>>());
    for record in records.iter() {
        assert_eq!(record.stamps.len(), 4, "record {} mis-stamped", record.id);
        assert!(record.stamps.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}

#[test]
fn assignments_can_shrink_between_updates() {
    const ITEMS: u64 = 20;

    let collected = Arc::new(Mutex::new(Vec::new()));
    let fabric = LoopbackFabric::new();
    let executor = Executor::new(1, Arc::new(LoopbackDataPlane::attach(fabric, 1)));
    executor.register_pipeline(stamping_pipeline(ITEMS, Arc::clone(&collected)));
    executor.start().unwrap();

    let mut assignments = SegmentAssignments::default();
    for (rank, segment) in ["seg1", "seg2", "seg3", "seg4"].iter().enumerate() {
        assignments.insert(
            SegmentAddress::new(1, 0, u32::try_from(rank).unwrap()),
            (*segment).to_string(),
        );
    }
    executor.push_updates(&assignments).unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        collected.lock().len() == ITEMS as usize
    }));

    // The source segment is retired after its stream finished; the rest of
    // the chain stays assigned.
    assignments.remove(&SegmentAddress::new(1, 0, 0));
    executor.push_updates(&assignments).unwrap();
    let running = executor.manager().unwrap().running();
    assert_eq!(
        running,
        vec![
            SegmentAddress::new(1, 0, 1),
            SegmentAddress::new(1, 0, 2),
            SegmentAddress::new(1, 0, 3),
        ]
    );

    executor.stop();
    assert_eq!(executor.join(), EXIT_OK);
    assert_eq!(collected.lock().len(), ITEMS as usize);
}
