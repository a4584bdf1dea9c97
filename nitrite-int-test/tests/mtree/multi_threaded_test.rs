use std::thread;

use nitrite_mtree::{EuclideanDistance, MetricIndex};
use nitrite_mtree_int_test::test_util::{
    assert_tree_valid, brute_force_range, cleanup, create_test_context, random_points, run_test,
};

#[test]
fn test_concurrent_writers_and_readers() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(2000, 2, 303);

            let writers: Vec<_> = points
                .chunks(500)
                .map(|chunk| {
                    let tree = ctx.tree();
                    let chunk = chunk.to_vec();
                    thread::spawn(move || {
                        for (id, point) in chunk {
                            tree.insert(id, point)?;
                        }
                        Ok::<_, nitrite_mtree::MTreeError>(())
                    })
                })
                .collect();

            let readers: Vec<_> = (0..2)
                .map(|i| {
                    let tree = ctx.tree();
                    thread::spawn(move || {
                        let query = vec![25.0 + 50.0 * i as f64, 50.0];
                        for _ in 0..50 {
                            let hits = tree.range_query(&query, 10.0)?;
                            // Results are always well formed, whatever was inserted so far
                            assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
                            assert!(hits.iter().all(|(_, d)| *d <= 10.0));
                        }
                        Ok::<_, nitrite_mtree::MTreeError>(())
                    })
                })
                .collect();

            for handle in writers.into_iter().chain(readers) {
                handle.join().expect("worker panicked")?;
            }

            let tree = ctx.tree();
            assert_eq!(tree.size(), 2000);
            assert_tree_valid(&tree)?;
            let query = vec![50.0, 50.0];
            assert_eq!(
                tree.range_query(&query, 25.0)?,
                brute_force_range(&points, &EuclideanDistance, &query, 25.0)
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_close_is_seen_by_every_clone() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            tree.insert(1, vec![1.0, 2.0])?;

            let other = ctx.tree();
            let handle = thread::spawn(move || other.close());
            handle.join().expect("close panicked")?;

            assert!(tree.is_closed());
            assert!(matches!(
                tree.insert(2, vec![0.0, 0.0]),
                Err(nitrite_mtree::MTreeError::Closed)
            ));
            assert!(matches!(
                tree.range_query(&vec![0.0, 0.0], 1.0),
                Err(nitrite_mtree::MTreeError::Closed)
            ));
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
