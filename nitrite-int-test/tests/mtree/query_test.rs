use nitrite_mtree::{
    EuclideanDistance, LevenshteinDistance, MTree, MTreeBuilder, ManhattanDistance, MetricIndex,
};
use nitrite_mtree_int_test::test_util::{
    brute_force_knn, brute_force_range, cleanup, create_memory_test_context, create_test_context,
    random_points, run_test,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_range_query_matches_linear_scan() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(500, 2, 31);
            tree.insert_bulk(points.clone())?;

            let diameter = 100.0 * 2f64.sqrt();
            let queries = random_points(20, 2, 32);
            for (i, (_, query)) in queries.iter().enumerate() {
                // Radii from diameter / 100 up to the full diameter
                let radius = diameter / 100.0 * (1.0 + 99.0 * i as f64 / 19.0);
                let expected = brute_force_range(&points, &EuclideanDistance, query, radius);
                let actual = tree.range_query(query, radius)?;
                assert_eq!(actual, expected, "query {:?} radius {}", query, radius);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_repeated_range_query_is_identical() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            tree.insert_bulk(random_points(800, 2, 2))?;

            let query = vec![40.0, 60.0];
            let first = tree.range_query(&query, 12.5)?;
            for _ in 0..5 {
                assert_eq!(tree.range_query(&query, 12.5)?, first);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_knn_matches_linear_scan() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(1000, 4, 77);
            tree.insert_bulk(points.clone())?;

            for (_, query) in random_points(10, 4, 78) {
                for k in [1, 5, 50] {
                    let expected = brute_force_knn(&points, &EuclideanDistance, &query, k);
                    let actual = tree.nearest_neighbors(&query, k)?;
                    assert_eq!(actual, expected, "k = {}", k);
                }
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_knn_within_distance_limit() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(500, 2, 12);
            tree.insert_bulk(points.clone())?;

            let query = vec![25.0, 75.0];
            let within = brute_force_range(&points, &EuclideanDistance, &query, 8.0);
            assert!(within.len() > 1);

            // The limit cuts the answer short
            let actual = tree.nearest_neighbors_within(&query, within.len() + 10, 8.0)?;
            assert_eq!(actual, within);

            // k cuts it shorter still
            let actual = tree.nearest_neighbors_within(&query, 1, 8.0)?;
            assert_eq!(actual, within[..1].to_vec());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_query_edge_cases() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let query = vec![0.0, 0.0];

            // Empty tree
            assert!(tree.range_query(&query, 10.0)?.is_empty());
            assert!(tree.nearest_neighbors(&query, 3)?.is_empty());

            tree.insert_bulk(random_points(100, 2, 3))?;
            assert!(tree.range_query(&query, -1.0)?.is_empty());
            assert!(tree.range_query(&query, f64::NAN)?.is_empty());
            assert!(tree.nearest_neighbors(&query, 0)?.is_empty());
            assert_eq!(tree.nearest_neighbors(&query, 1000)?.len(), 100);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_pruning_saves_distance_computations() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            tree.insert_bulk(random_points(2000, 2, 44))?;

            let before = tree.stats().distance_computations;
            let hits = tree.range_query(&vec![10.0, 10.0], 3.0)?;
            let used = tree.stats().distance_computations - before;
            assert!(hits.len() < 50);
            assert!(used < 2000, "range query computed {} distances", used);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_other_metrics() {
    // Manhattan distance over points
    let points = random_points(300, 3, 90);
    let tree: MTree<Vec<f64>> = MTreeBuilder::new()
        .page_size(512)
        .build(ManhattanDistance)
        .unwrap();
    tree.insert_bulk(points.clone()).unwrap();
    let query = vec![50.0, 50.0, 50.0];
    assert_eq!(
        tree.range_query(&query, 40.0).unwrap(),
        brute_force_range(&points, &ManhattanDistance, &query, 40.0)
    );
    assert_eq!(
        tree.nearest_neighbors(&query, 7).unwrap(),
        brute_force_knn(&points, &ManhattanDistance, &query, 7)
    );

    // Edit distance over random words. Capacities are measured on the first
    // word, so all words have the same length.
    let mut rng = StdRng::seed_from_u64(5);
    let words: Vec<(u64, String)> = (0..400u64)
        .map(|id| {
            let word = (0..6)
                .map(|_| (b'a' + rng.gen_range(0..6u8)) as char)
                .collect();
            (id, word)
        })
        .collect();
    let tree: MTree<String> = MTreeBuilder::new()
        .page_size(512)
        .build(LevenshteinDistance)
        .unwrap();
    tree.insert_bulk(words.clone()).unwrap();

    let query = "abcab".to_string();
    for radius in [0.0, 1.0, 2.0, 3.0] {
        assert_eq!(
            tree.range_query(&query, radius).unwrap(),
            brute_force_range(&words, &LevenshteinDistance, &query, radius)
        );
    }
    assert_eq!(
        tree.nearest_neighbors(&query, 10).unwrap(),
        brute_force_knn(&words, &LevenshteinDistance, &query, 10)
    );
    assert!(tree.check_integrity().unwrap().is_valid);
}

#[test]
fn test_closure_distance() {
    let tree = MTree::in_memory(|a: &i64, b: &i64| (a - b).abs() as f64).unwrap();
    for i in 0..500i64 {
        tree.insert(i as u64, i * 3).unwrap();
    }
    let hits = tree.range_query(&300, 6.0).unwrap();
    assert_eq!(hits, vec![(100, 0.0), (99, 3.0), (101, 3.0), (98, 6.0), (102, 6.0)]);
    assert_eq!(tree.nearest_neighbors(&1000, 1).unwrap(), vec![(333, 1.0)]);
}
