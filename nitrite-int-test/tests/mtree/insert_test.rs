use std::collections::HashSet;

use nitrite_mtree::{EuclideanDistance, MTree, MTreeBuilder, MetricIndex};
use nitrite_mtree_int_test::test_util::{
    assert_tree_valid, cleanup, create_memory_test_context, create_test_context, random_points,
    run_test, TEST_PAGE_SIZE,
};

#[test]
fn test_insert_then_unbounded_range_returns_everything_once() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(1000, 3, 17);
            for (id, point) in &points {
                tree.insert(*id, point.clone())?;
            }
            assert_eq!(tree.size(), 1000);
            assert!(tree.height() > 1);

            let results = tree.range_query(&vec![50.0, 50.0, 50.0], f64::INFINITY)?;
            assert_eq!(results.len(), 1000);
            let ids: HashSet<_> = results.iter().map(|(id, _)| *id).collect();
            assert_eq!(ids.len(), 1000);
            assert!(points.iter().all(|(id, _)| ids.contains(id)));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_covering_radius_invariant_holds_while_growing() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(600, 2, 5);
            for (i, (id, point)) in points.iter().enumerate() {
                tree.insert(*id, point.clone())?;
                if i % 50 == 49 {
                    assert_tree_valid(&tree)?;
                }
            }
            assert_tree_valid(&tree)?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_bulk_insert_matches_sequential_inserts() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let points = random_points(400, 2, 23);

            let bulk = ctx.tree();
            bulk.insert_bulk(points.clone())?;

            let sequential: MTree<Vec<f64>> = MTreeBuilder::new()
                .page_size(TEST_PAGE_SIZE)
                .seed(42)
                .build(EuclideanDistance)?;
            for (id, point) in &points {
                sequential.insert(*id, point.clone())?;
            }

            assert_eq!(bulk.size(), sequential.size());
            assert_eq!(bulk.height(), sequential.height());
            for (_, query) in points.iter().take(10) {
                assert_eq!(
                    bulk.range_query(query, 15.0)?,
                    sequential.range_query(query, 15.0)?
                );
            }
            assert_tree_valid(&bulk)?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_duplicate_objects_are_kept() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            for id in 0..100 {
                tree.insert(id, vec![1.0, 1.0])?;
            }
            let results = tree.range_query(&vec![1.0, 1.0], 0.0)?;
            assert_eq!(results.len(), 100);
            assert!(results.iter().all(|(_, d)| *d == 0.0));
            // Ties come back ordered by id
            assert!(results.windows(2).all(|w| w[0].0 < w[1].0));
            assert_tree_valid(&tree)?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_statistics_follow_inserts() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let before = tree.stats();
            assert_eq!(before.total_entries, 0);
            assert_eq!(before.tree_height, 0);
            assert_eq!(before.leaf_capacity, 0);

            tree.insert_bulk(random_points(300, 2, 8))?;
            let stats = tree.stats();
            assert_eq!(stats.total_entries, 300);
            assert_eq!(stats.tree_height, tree.height());
            assert!(stats.leaf_capacity >= 2);
            assert!(stats.dir_capacity >= 2);
            assert!(stats.allocated_pages as usize > 300 / stats.leaf_capacity);
            assert!(stats.distance_computations > 0);
            // The cache was bounded to 16 pages
            assert!(stats.cached_pages <= 16);
            assert!(stats.physical_writes > 0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
