use nitrite_mtree::{MTreeResult, MetricIndex};
use nitrite_mtree_int_test::test_util::{cleanup, create_test_context, random_points};

fn main() -> MTreeResult<()> {
    colog::init();
    println!("Starting stress test...");
    let ctx = create_test_context()?;
    let tree = ctx.tree();

    let count = 200_000;
    let points = random_points(count, 8, 1);

    let start = std::time::Instant::now();
    for (id, point) in &points {
        tree.insert(*id, point.clone())?;
    }
    let elapsed = start.elapsed();
    let stats = tree.stats();
    println!(
        "Inserted {} points in {:?} (height {}, {} pages, {} distance computations)",
        count, elapsed, stats.tree_height, stats.allocated_pages, stats.distance_computations
    );

    tree.reset_page_access();
    let start = std::time::Instant::now();
    let mut found = 0;
    for (_, query) in points.iter().take(1000) {
        found += tree.range_query(query, 20.0)?.len();
    }
    let stats = tree.stats();
    println!(
        "Ran 1000 range queries in {:?}: {} hits, {} logical / {} physical page reads",
        start.elapsed(),
        found,
        stats.logical_accesses,
        stats.physical_reads
    );

    tree.reset_page_access();
    let start = std::time::Instant::now();
    for (_, query) in points.iter().take(1000) {
        tree.nearest_neighbors(query, 10)?;
    }
    let stats = tree.stats();
    println!(
        "Ran 1000 10-NN queries in {:?}: {} logical / {} physical page reads",
        start.elapsed(),
        stats.logical_accesses,
        stats.physical_reads
    );

    let start = std::time::Instant::now();
    let mut deleted = 0;
    for (id, point) in points.iter().step_by(2) {
        if tree.delete(*id, point)? {
            deleted += 1;
        }
    }
    println!("Deleted {} points in {:?}", deleted, start.elapsed());

    let report = tree.check_integrity()?;
    println!(
        "Integrity: valid={} nodes={} entries={}",
        report.is_valid, report.nodes_checked, report.entries_found
    );

    cleanup(ctx)?;
    Ok(())
}
