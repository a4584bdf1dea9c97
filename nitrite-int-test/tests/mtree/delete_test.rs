use nitrite_mtree::{EuclideanDistance, MetricIndex};
use nitrite_mtree_int_test::test_util::{
    assert_tree_valid, brute_force_range, cleanup, create_memory_test_context,
    create_test_context, random_points, run_test,
};

#[test]
fn test_insert_then_delete() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(300, 2, 9);
            tree.insert_bulk(points.clone())?;

            let (id, point) = points[123].clone();
            assert!(tree.delete(id, &point)?);
            assert_eq!(tree.size(), 299);
            assert!(tree.range_query(&point, 0.0)?.is_empty());

            // A second delete finds nothing
            assert!(!tree.delete(id, &point)?);
            assert_eq!(tree.size(), 299);
            assert_tree_valid(&tree)?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_absent_object() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            // Empty tree
            assert!(!tree.delete(1, &vec![1.0, 1.0])?);

            tree.insert_bulk(random_points(50, 2, 1))?;
            assert!(!tree.delete(1000, &vec![1.0, 1.0])?);
            // Right payload, wrong id
            let points = random_points(50, 2, 1);
            assert!(!tree.delete(999, &points[0].1)?);
            assert_eq!(tree.size(), 50);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_one_of_equal_objects() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            for id in 0..40 {
                tree.insert(id, vec![5.0, 5.0])?;
            }
            assert!(tree.delete(17, &vec![5.0, 5.0])?);
            let remaining = tree.range_query(&vec![5.0, 5.0], 0.0)?;
            assert_eq!(remaining.len(), 39);
            assert!(remaining.iter().all(|(id, _)| *id != 17));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_interleaved_inserts_and_deletes() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(900, 2, 64);
            let mut live = Vec::new();

            for chunk in points.chunks(100) {
                tree.insert_bulk(chunk.to_vec())?;
                live.extend_from_slice(chunk);

                // Drop every third live object
                let mut kept = Vec::new();
                for (i, (id, point)) in live.drain(..).enumerate() {
                    if i % 3 == 0 {
                        assert!(tree.delete(id, &point)?);
                    } else {
                        kept.push((id, point));
                    }
                }
                live = kept;

                assert_eq!(tree.size(), live.len() as u64);
                assert_tree_valid(&tree)?;
            }

            let query = vec![50.0, 50.0];
            assert_eq!(
                tree.range_query(&query, 30.0)?,
                brute_force_range(&live, &EuclideanDistance, &query, 30.0)
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_everything_shrinks_tree() {
    run_test(
        || create_memory_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(400, 2, 19);
            tree.insert_bulk(points.clone())?;
            assert!(tree.height() > 1);

            for (id, point) in &points {
                assert!(tree.delete(*id, point)?);
            }
            assert_eq!(tree.size(), 0);
            assert_eq!(tree.height(), 1);
            assert!(tree.range_query(&vec![50.0, 50.0], f64::INFINITY)?.is_empty());
            assert_tree_valid(&tree)?;

            // The emptied tree takes new objects
            tree.insert_bulk(points[..10].to_vec())?;
            assert_eq!(tree.nearest_neighbors(&points[0].1, 1)?[0].0, points[0].0);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
