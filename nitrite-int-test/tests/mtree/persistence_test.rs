use std::fs;

use nitrite_mtree::{
    DistributionKind, EuclideanDistance, MTree, MTreeBuilder, MTreeError, MetricIndex,
    PromotionKind, SplitConfig,
};
use nitrite_mtree_int_test::test_util::{
    assert_tree_valid, cleanup, create_file_test_context, create_test_context, random_path,
    random_points, run_test, TEST_PAGE_SIZE,
};

#[test]
fn test_reopen_gives_identical_answers() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            let path = ctx.file_path().expect("file-backed context");
            let points = random_points(700, 2, 101);
            tree.insert_bulk(points)?;

            let queries = random_points(15, 2, 102);
            let mut ranges = Vec::new();
            let mut neighbors = Vec::new();
            for (_, query) in &queries {
                ranges.push(tree.range_query(query, 10.0)?);
                neighbors.push(tree.nearest_neighbors(query, 8)?);
            }
            let stats = tree.stats();
            tree.close()?;

            let reopened: MTree<Vec<f64>> = MTree::open(&path, EuclideanDistance)?;
            assert_eq!(reopened.size(), 700);
            assert_eq!(reopened.height(), stats.tree_height);
            assert_eq!(reopened.stats().leaf_capacity, stats.leaf_capacity);
            assert_eq!(reopened.stats().dir_capacity, stats.dir_capacity);
            for (i, (_, query)) in queries.iter().enumerate() {
                assert_eq!(reopened.range_query(query, 10.0)?, ranges[i]);
                assert_eq!(reopened.nearest_neighbors(query, 8)?, neighbors[i]);
            }
            assert_tree_valid(&reopened)?;
            reopened.close()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_reopened_tree_keeps_growing() {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file_path().expect("file-backed context");
            let points = random_points(600, 2, 55);
            ctx.tree().insert_bulk(points[..300].to_vec())?;
            ctx.tree().close()?;

            let reopened: MTree<Vec<f64>> = MTreeBuilder::new()
                .cache_pages(4)
                .file_path(&path)
                .open(EuclideanDistance)?;
            reopened.insert_bulk(points[300..].to_vec())?;
            let (id, point) = points[10].clone();
            assert!(reopened.delete(id, &point)?);
            reopened.close()?;

            let again: MTree<Vec<f64>> = MTree::open(&path, EuclideanDistance)?;
            assert_eq!(again.size(), 599);
            assert_eq!(
                again.range_query(&vec![50.0, 50.0], f64::INFINITY)?.len(),
                599
            );
            assert_tree_valid(&again)?;
            again.close()?;
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_fixed_seed_gives_byte_identical_files() {
    for promotion in [PromotionKind::Random, PromotionKind::sampled_mrad()] {
        let split = SplitConfig {
            promotion,
            distribution: DistributionKind::Balanced,
            seed: Some(2024),
        };
        let points = random_points(500, 3, 7);

        let mut files = Vec::new();
        for _ in 0..2 {
            let ctx = create_file_test_context(split).unwrap();
            let path = ctx.file_path().unwrap();
            ctx.tree().insert_bulk(points.clone()).unwrap();
            ctx.tree().close().unwrap();
            files.push(fs::read(&path).unwrap());
            cleanup(ctx).unwrap();
        }
        assert!(files[0].len() > TEST_PAGE_SIZE);
        assert!(files[0] == files[1], "{:?} produced different files", promotion);
    }
}

#[test]
fn test_file_is_page_aligned() {
    run_test(
        || create_test_context(),
        |ctx| {
            let tree = ctx.tree();
            tree.insert_bulk(random_points(250, 2, 3))?;
            let pages = tree.stats().allocated_pages;
            tree.close()?;

            let path = ctx.file_path().expect("file-backed context");
            let len = fs::metadata(&path)?.len();
            assert_eq!(len % TEST_PAGE_SIZE as u64, 0);
            // Header page plus every allocated page
            assert_eq!(len / TEST_PAGE_SIZE as u64, pages + 1);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_open_rejects_foreign_file() {
    let dir = random_path();
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("garbage.mtree");
    fs::write(&path, vec![7u8; 4096]).unwrap();

    let result: Result<MTree<Vec<f64>>, _> = MTree::open(&path, EuclideanDistance);
    assert!(matches!(result, Err(MTreeError::Storage(_)) | Err(MTreeError::Serialization(_))));

    let missing: Result<MTree<Vec<f64>>, _> =
        MTree::open(dir.join("missing.mtree"), EuclideanDistance);
    assert!(matches!(missing, Err(MTreeError::Io(_))));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_drop_without_close_persists() {
    let dir = random_path();
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("dropped.mtree");
    let points = random_points(200, 2, 15);
    {
        let tree: MTree<Vec<f64>> = MTreeBuilder::new()
            .page_size(TEST_PAGE_SIZE)
            .file_path(&path)
            .build(EuclideanDistance)
            .unwrap();
        tree.insert_bulk(points.clone()).unwrap();
    }

    let tree: MTree<Vec<f64>> = MTree::open(&path, EuclideanDistance).unwrap();
    assert_eq!(tree.size(), 200);
    assert_eq!(
        tree.nearest_neighbors(&points[42].1, 1).unwrap(),
        vec![(42, 0.0)]
    );
    tree.close().unwrap();
    fs::remove_dir_all(&dir).unwrap();
}
