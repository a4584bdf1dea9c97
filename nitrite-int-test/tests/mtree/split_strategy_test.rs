use nitrite_mtree::{
    DistributionKind, EuclideanDistance, MTree, MTreeBuilder, MetricIndex, PromotionKind,
    SplitConfig,
};
use nitrite_mtree_int_test::test_util::{
    assert_tree_valid, brute_force_knn, brute_force_range, cleanup, create_file_test_context,
    random_points, run_test,
};

const PROMOTIONS: [PromotionKind; 6] = [
    PromotionKind::Random,
    PromotionKind::MRad,
    PromotionKind::MMRad,
    PromotionKind::MaxDistance,
    PromotionKind::FarthestPoints,
    PromotionKind::SampledMRad { samples: 10 },
];

const DISTRIBUTIONS: [DistributionKind; 3] = [
    DistributionKind::GeneralizedHyperplane,
    DistributionKind::Balanced,
    DistributionKind::DifferenceBalanced,
];

#[test]
fn test_every_strategy_answers_like_a_linear_scan() {
    let points = random_points(400, 2, 500);
    let queries = random_points(5, 2, 501);

    for promotion in PROMOTIONS {
        for distribution in DISTRIBUTIONS {
            let split = SplitConfig {
                promotion,
                distribution,
                seed: Some(9),
            };
            let tree: MTree<Vec<f64>> = MTreeBuilder::new()
                .page_size(512)
                .split(split)
                .build(EuclideanDistance)
                .unwrap();
            tree.insert_bulk(points.clone()).unwrap();
            assert_tree_valid(&tree).unwrap();

            for (_, query) in &queries {
                assert_eq!(
                    tree.range_query(query, 20.0).unwrap(),
                    brute_force_range(&points, &EuclideanDistance, query, 20.0),
                    "{:?}",
                    split
                );
                assert_eq!(
                    tree.nearest_neighbors(query, 5).unwrap(),
                    brute_force_knn(&points, &EuclideanDistance, query, 5),
                    "{:?}",
                    split
                );
            }
        }
    }
}

#[test]
fn test_file_backed_strategy_with_deletes() {
    run_test(
        || {
            create_file_test_context(SplitConfig {
                promotion: PromotionKind::FarthestPoints,
                distribution: DistributionKind::DifferenceBalanced,
                seed: None,
            })
        },
        |ctx| {
            let tree = ctx.tree();
            let points = random_points(500, 5, 77);
            tree.insert_bulk(points.clone())?;
            for (id, point) in points.iter().filter(|(id, _)| id % 4 == 0) {
                assert!(tree.delete(*id, point)?);
            }
            assert_eq!(tree.size(), 375);
            assert_tree_valid(&tree)?;

            let remaining: Vec<_> = points.into_iter().filter(|(id, _)| id % 4 != 0).collect();
            let query = vec![50.0; 5];
            assert_eq!(
                tree.nearest_neighbors(&query, 20)?,
                brute_force_knn(&remaining, &EuclideanDistance, &query, 20)
            );
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_exhaustive_promotion_builds_tighter_trees() {
    // m-RAD optimizes covering radii, random promotion does not: over the
    // same data the former should need no more distance computations to
    // answer a batch of small range queries.
    let points = random_points(1500, 2, 2);
    let queries = random_points(30, 2, 3);

    let cost = |promotion: PromotionKind| {
        let tree: MTree<Vec<f64>> = MTreeBuilder::new()
            .page_size(512)
            .promotion(promotion)
            .seed(1)
            .build(EuclideanDistance)
            .unwrap();
        tree.insert_bulk(points.clone()).unwrap();
        let before = tree.stats().distance_computations;
        for (_, query) in &queries {
            tree.range_query(query, 2.0).unwrap();
        }
        tree.stats().distance_computations - before
    };

    let exhaustive = cost(PromotionKind::MRad);
    let random = cost(PromotionKind::Random);
    assert!(
        exhaustive <= random * 3 / 2,
        "m-RAD used {} distance computations, random {}",
        exhaustive,
        random
    );
}
