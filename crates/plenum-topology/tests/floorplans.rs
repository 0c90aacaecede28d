//! Integration test: run synthetic floorplans through the full planner.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use plenum_topology::{
    PartitionConfig, PlanConfig, PlanInput, Point, Segment, TreeAlgorithm, VertexId, process,
};

fn p(x: f64, y: f64) -> Point {
    Point::new(x, y)
}

fn seg(x0: f64, y0: f64, x1: f64, y1: f64) -> Segment {
    Segment::new(p(x0, y0), p(x1, y1))
}

/// A closed axis-aligned rectangle.
fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Segment> {
    vec![
        seg(x0, y0, x1, y0),
        seg(x1, y0, x1, y1),
        seg(x1, y1, x0, y1),
        seg(x0, y1, x0, y0),
    ]
}

/// Three 10x10 rooms in a row.
fn three_rooms() -> Vec<Segment> {
    let mut out = rect(0.0, 0.0, 30.0, 10.0);
    out.push(seg(10.0, 0.0, 10.0, 10.0));
    out.push(seg(20.0, 0.0, 20.0, 10.0));
    out
}

fn unregularized() -> PlanConfig {
    PlanConfig {
        regularize: false,
        ..PlanConfig::default()
    }
}

#[test]
fn rooms_become_labelled_regions() {
    let input = PlanInput {
        segments: three_rooms(),
        ..PlanInput::default()
    };
    let plan = process(&input, &unregularized()).expect("plan should succeed");

    assert_eq!(plan.faces.shells.len(), 1);
    assert_eq!(plan.faces.regions.len(), 3);
    for region in &plan.faces.regions {
        assert!((region.area - 100.0).abs() < 1e-9, "region {} area {}", region.id, region.area);
        assert_eq!(region.labels.len(), region.loop_points.len());
        assert!(region.label.starts_with('Z'));
    }
    // The middle room shares a wall with each neighbour.
    let shared = plan
        .faces
        .regions
        .iter()
        .map(|r| r.labels.iter().filter(|l| l.contains("::Wall_")).count())
        .max()
        .unwrap();
    assert_eq!(shared, 2);
}

#[test]
fn skewed_walls_are_regularized_before_faces() {
    // Same rooms with the dividers leaning slightly off vertical.
    let mut segments = rect(0.0, 0.0, 30.0, 10.0);
    segments.push(seg(10.0, 0.0, 10.03, 10.0));
    segments.push(seg(20.0, 0.0, 19.98, 10.0));
    let input = PlanInput {
        segments,
        ..PlanInput::default()
    };
    let plan = process(&input, &PlanConfig::default()).expect("plan should succeed");

    assert_eq!(plan.faces.regions.len(), 3);
    for s in &plan.segments {
        let d = s.direction();
        assert!(
            d.x.abs() < 1e-9 || d.y.abs() < 1e-9,
            "segment {s:?} is not axis aligned"
        );
    }
}

#[test]
fn a_room_inside_a_room_becomes_a_hole() {
    let mut segments = rect(0.0, 0.0, 40.0, 40.0);
    segments.extend(rect(10.0, 10.0, 30.0, 30.0));
    let input = PlanInput {
        segments,
        ..PlanInput::default()
    };
    let plan = process(&input, &unregularized()).expect("plan should succeed");

    let outer = plan
        .faces
        .regions
        .iter()
        .find(|r| (r.area - 1600.0).abs() < 1e-6)
        .expect("outer region");
    assert_eq!(outer.holes.len(), 1);
    assert_eq!(plan.faces.shells.len(), 1);
}

#[test]
fn tree_reaches_every_terminal_from_the_source() {
    let input = PlanInput {
        segments: three_rooms(),
        terminals: vec![p(5.0, 2.0), p(15.0, 8.0), p(25.0, 2.0)],
        sources: vec![p(0.0, 5.0)],
        ..PlanInput::default()
    };
    for algorithm in [TreeAlgorithm::Mst, TreeAlgorithm::Spt] {
        let config = PlanConfig {
            tree_algorithm: algorithm,
            ..unregularized()
        };
        let plan = process(&input, &config).expect("plan should succeed");
        let zone = &plan.zone;

        let root = zone.root.expect("rooted");
        let root_vertex = zone.graph.vertex(root).unwrap();
        assert!(root_vertex.is_root);
        assert!(root_vertex.coords.distance(p(0.0, 5.0)) < 1e-9);
        assert_eq!(zone.terminals.len(), 3);
        for &t in &zone.terminals {
            assert!(
                zone.graph.vertex(t).unwrap().depth.is_some(),
                "{algorithm:?}: {t:?} unreached"
            );
        }
        // Grafted: every non-root vertex has exactly one parent.
        for (id, _) in zone.graph.vertices() {
            let parents = zone
                .graph
                .vertices()
                .filter(|(_, v)| v.neighbors().iter().any(|&(n, _)| n == id))
                .count();
            assert_eq!(parents, usize::from(id != root), "{algorithm:?}: vertex {id:?}");
        }
        assert!(zone.connection.connections.len() >= 3);
    }
}

#[test]
fn partition_splits_terminals_into_balanced_forests() {
    let input = PlanInput {
        segments: three_rooms(),
        terminals: vec![p(2.0, 0.0), p(8.0, 0.0), p(22.0, 0.0), p(28.0, 0.0)],
        ..PlanInput::default()
    };
    let config = PlanConfig {
        partition: Some(PartitionConfig {
            count: 2,
            time_limit_secs: 60.0,
            ..PartitionConfig::default()
        }),
        ..unregularized()
    };
    let plan = process(&input, &config).expect("plan should succeed");

    let outcome = plan.partition.expect("partition ran");
    let best = outcome.best().expect("feasible partition");
    let total: f64 = best.forests.iter().map(|f| f.load).sum();
    assert!((total - 4.0).abs() < 1e-6);
    assert_eq!(best.forests.len(), 2);
    for forest in &best.forests {
        assert!((forest.load - 2.0).abs() < 1e-6, "unbalanced load {}", forest.load);
    }

    // Every terminal is served by exactly one forest.
    let served: Vec<Vec<VertexId>> = best
        .forests
        .iter()
        .map(plenum_topology::Forest::vertices)
        .collect();
    for &t in &plan.zone.terminals {
        assert_eq!(served.iter().filter(|vs| vs.contains(&t)).count(), 1, "terminal {t:?}");
    }
}

#[test]
fn plan_serializes_to_json() {
    let input = PlanInput {
        segments: three_rooms(),
        terminals: vec![p(5.0, 5.0)],
        ..PlanInput::default()
    };
    let plan = process(&input, &unregularized()).unwrap();
    let json = serde_json::to_value(&plan).unwrap();
    assert!(json["faces"]["regions"].is_array());
    assert!(json["zone"]["graph"]["vertices"].is_array());

    let back: PlanInput = serde_json::from_str(&serde_json::to_string(&input).unwrap()).unwrap();
    assert_eq!(back, input);
}
