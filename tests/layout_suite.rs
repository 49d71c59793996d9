use colayout::cluster::{ClusterHierarchy, Lock, ROOT_CLUSTER, remove_cluster_overlap_fast};
use colayout::overlap::{RemoveOverlapsOptions, has_overlaps, remove_overlaps, remove_overlaps_with_options};
use colayout::scene::{Scene, run};
use colayout::topology::{EdgeState, TopologyEdge, TopologyRouter};
use colayout::vpsc::{Constraint, Solver, Variable, solve};
use colayout::{LayoutConfig, LayoutError, Rectangle};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn grid_of_overlapping_squares(n: usize) -> Vec<Rectangle> {
    (0..n * n)
        .map(|k| {
            let (i, j) = ((k % n) as f64, (k / n) as f64);
            Rectangle::from_centre(i * 6.0, j * 6.0 + 0.5 * i, 10.0, 10.0)
        })
        .collect()
}

#[test]
fn solver_matches_hand_computed_optimum() {
    let vars = vec![Variable::new(0.0, 1.0); 3];
    let cs = vec![Constraint::new(0, 1, 5.0), Constraint::new(1, 2, 5.0)];
    let positions = solve(&vars, &cs).expect("solve");
    assert!(close(positions[0], -5.0));
    assert!(close(positions[1], 0.0));
    assert!(close(positions[2], 5.0));
}

#[test]
fn infeasible_cycle_is_reported_not_solved() {
    let vars = vec![Variable::new(0.0, 1.0); 3];
    let cs = vec![
        Constraint::new(0, 1, 1.0),
        Constraint::new(1, 2, 1.0),
        Constraint::new(2, 0, 1.0),
    ];
    match Solver::new(vars, cs) {
        Err(LayoutError::InfeasibleConstraints { cycle, total_gap }) => {
            assert_eq!(cycle.len(), 3);
            assert!(close(total_gap, 3.0));
        }
        other => panic!("expected infeasible constraints, got {other:?}"),
    }
}

#[test]
fn overlapping_grid_becomes_disjoint() {
    let mut rects = grid_of_overlapping_squares(4);
    assert!(has_overlaps(&rects, 1e-6));
    remove_overlaps(&mut rects).expect("remove");
    assert!(!has_overlaps(&rects, 1e-6));
    assert!(rects.iter().all(|r| r.width == 10.0 && r.height == 10.0));
}

#[test]
fn neighbour_lists_and_full_scan_both_clear_overlap() {
    let config = LayoutConfig::default();
    for use_neighbour_lists in [false, true] {
        let mut rects = grid_of_overlapping_squares(3);
        let options = RemoveOverlapsOptions {
            use_neighbour_lists,
            ..RemoveOverlapsOptions::from_config(&config)
        };
        remove_overlaps_with_options(&mut rects, &options, &config).expect("remove");
        assert!(!has_overlaps(&rects, 1e-6), "neighbour lists: {use_neighbour_lists}");
    }
}

#[test]
fn nested_clusters_keep_members_inside() {
    let mut hierarchy = ClusterHierarchy::new();
    let outer = hierarchy.add_cluster(ROOT_CLUSTER).expect("outer");
    let inner = hierarchy.add_cluster(outer).expect("inner");
    let mut rects = vec![
        Rectangle::from_centre(0.0, 0.0, 12.0, 12.0),
        Rectangle::from_centre(3.0, 1.0, 12.0, 12.0),
        Rectangle::from_centre(5.0, 4.0, 12.0, 12.0),
        Rectangle::from_centre(2.0, 2.0, 8.0, 8.0),
    ];
    hierarchy.add_rectangle(outer, 0).expect("add");
    hierarchy.add_rectangle(inner, 1).expect("add");
    hierarchy.add_rectangle(inner, 2).expect("add");
    let config = LayoutConfig::default();
    remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &[], &config).expect("remove");

    assert!(!has_overlaps(&rects, 1e-6));
    let outer_bounds = hierarchy.cluster(outer).and_then(|c| c.bounds).expect("outer bounds");
    let inner_bounds = hierarchy.cluster(inner).and_then(|c| c.bounds).expect("inner bounds");
    assert!(outer_bounds.contains_rect(&inner_bounds, 1e-6));
    for r in 0..3 {
        assert!(outer_bounds.contains_rect(&rects[r], 1e-6));
    }
    assert!(!outer_bounds.overlaps(&rects[3], 1e-6));
}

#[test]
fn locked_rectangle_stays_put_in_cluster_pass() {
    let mut hierarchy = ClusterHierarchy::new();
    let mut rects = vec![
        Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
        Rectangle::from_centre(2.0, 0.0, 10.0, 10.0),
    ];
    let locks = [Lock {
        rect: 0,
        x: 0.0,
        y: 0.0,
    }];
    let config = LayoutConfig::default();
    remove_cluster_overlap_fast(&mut hierarchy, &mut rects, &locks, &config).expect("remove");
    assert!((rects[0].centre_x()).abs() < 1e-3);
    assert!((rects[0].centre_y()).abs() < 1e-3);
    assert!(!has_overlaps(&rects, 1e-6));
}

#[test]
fn router_follows_rectangles_through_overlap_removal() {
    let mut rects = vec![
        Rectangle::from_centre(0.0, 0.0, 10.0, 10.0),
        Rectangle::from_centre(120.0, 0.0, 10.0, 10.0),
        Rectangle::from_centre(60.0, 40.0, 20.0, 20.0),
        Rectangle::from_centre(62.0, 30.0, 20.0, 20.0),
    ];
    let mut router = TopologyRouter::default();
    router
        .add_edge(TopologyEdge::between(7, 0, 1, 120.0).expect("edge"), &rects)
        .expect("add");
    router.route_all(&rects).expect("route");

    remove_overlaps(&mut rects).expect("remove");
    router.update_positions(&rects).expect("update");

    let edge = router.edge(7).expect("edge");
    assert_eq!(edge.state(), EdgeState::Routed);
    assert!(edge.assert_convex_bends(&rects));
    assert!(!edge.cycle(&rects, 1e-9));
    assert!(edge.straightness(&rects) > 0.0 && edge.straightness(&rects) <= 1.0);
    assert!(edge.length_deviation(&rects) >= -1e-9);
}

#[test]
fn scene_pipeline_end_to_end() {
    let scene: Scene = serde_json::from_str(
        r#"{
            "rects": [
                {"x": 0, "y": 0, "width": 30, "height": 20},
                {"x": 20, "y": 10, "width": 30, "height": 20},
                {"x": 25, "y": 5, "width": 10, "height": 10},
                {"x": 200, "y": 0, "width": 30, "height": 20}
            ],
            "clusters": [{"members": [0, 1]}],
            "locks": [{"rect": 3, "x": 215, "y": 10}],
            "edges": [
                {"source": 0, "target": 3, "idealLength": 150},
                {"source": 2, "target": 3}
            ]
        }"#,
    )
    .expect("scene");
    let dump = run(&scene, &LayoutConfig::default(), true).expect("run");
    assert!(!dump.residual_overlap);
    assert_eq!(dump.rects.len(), 4);
    assert_eq!(dump.edges.len(), 2);
    assert!(dump.edges.iter().all(|e| e.state == EdgeState::Routed));
    let cluster = dump.clusters[0].bounds.expect("cluster bounds");
    assert!(cluster.contains_rect(&dump.rects[0], 1e-6));
    assert!(cluster.contains_rect(&dump.rects[1], 1e-6));
    assert!(!cluster.overlaps(&dump.rects[2], 1e-6));

    let json = serde_json::to_value(&dump).expect("serialize");
    assert!(json["edges"][0]["lengthDeviation"].is_number());
    assert!(json["residualOverlap"].is_boolean());
}
