use nitrite_mtree::{
    DistanceFunction, EuclideanDistance, MTree, MTreeBuilder, MTreeResult,
    MetricIndex, ObjectId, SplitConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs, thread};

/// Page size used by test trees. Small pages make for deep trees with many
/// splits even on a few hundred points.
pub const TEST_PAGE_SIZE: usize = 512;

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread so a panic is reported with the context it happened in.
pub fn run_test<T, B, A>(before: B, test: T, after: A) -> ()
where
    T: Fn(TestContext) -> MTreeResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> MTreeResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> MTreeResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((
                            format!("After run failed: {:?}", e),
                            backtrace.to_string(),
                        )),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return, // Test passed
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    format!("Unknown panic: {:?}", panic_err.type_id())
                };

                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Panic: {}", err_msg);
                    eprintln!("Retrying in {}ms...\n", 100 * attempt);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
        }
    }

    // All retries exhausted - print full details
    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A tree under test plus the directory holding its file, if any.
#[derive(Clone)]
pub struct TestContext {
    dir: Option<PathBuf>,
    tree: MTree<Vec<f64>>,
}

impl TestContext {
    pub fn new(dir: Option<PathBuf>, tree: MTree<Vec<f64>>) -> Self {
        Self { dir, tree }
    }

    /// Directory of the backing file, `None` for memory-only trees
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Path of the backing file, `None` for memory-only trees
    pub fn file_path(&self) -> Option<PathBuf> {
        self.tree.path().map(Path::to_path_buf)
    }

    pub fn tree(&self) -> MTree<Vec<f64>> {
        self.tree.clone()
    }
}

pub fn random_path() -> PathBuf {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(format!("nitrite_mtree_{}", id))
}

/// A fresh file-backed tree with small pages and the given split strategy.
pub fn create_file_test_context(split: SplitConfig) -> MTreeResult<TestContext> {
    let dir = random_path();
    fs::create_dir_all(&dir)?;

    let tree = MTreeBuilder::new()
        .page_size(TEST_PAGE_SIZE)
        .cache_pages(16)
        .split(split)
        .file_path(dir.join("test.mtree"))
        .build(EuclideanDistance);

    match tree {
        Ok(tree) => Ok(TestContext::new(Some(dir), tree)),
        Err(e) => {
            let _ = fs::remove_dir_all(&dir);
            Err(e)
        }
    }
}

/// A fresh file-backed tree with the default split strategy and a fixed seed.
pub fn create_test_context() -> MTreeResult<TestContext> {
    create_file_test_context(SplitConfig {
        seed: Some(42),
        ..SplitConfig::default()
    })
}

/// A fresh memory-only tree with small pages.
pub fn create_memory_test_context() -> MTreeResult<TestContext> {
    let tree = MTreeBuilder::new()
        .page_size(TEST_PAGE_SIZE)
        .seed(42)
        .build(EuclideanDistance)?;
    Ok(TestContext::new(None, tree))
}

pub fn cleanup(ctx: TestContext) -> MTreeResult<()> {
    // Closing twice is fine if the test already did
    if let Err(e) = ctx.tree().close() {
        eprintln!("Warning: Failed to close tree: {:?}", e);
    }

    if let Some(dir) = ctx.dir() {
        if let Err(e) = fs::remove_dir_all(dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                eprintln!(
                    "Warning: Failed to remove test directory {}: {:?}",
                    dir.display(),
                    e
                );
            }
        }
    }
    Ok(())
}

/// `n` points drawn uniformly from `[0, 100)^dim`, ids `0..n`.
pub fn random_points(n: usize, dim: usize, seed: u64) -> Vec<(ObjectId, Vec<f64>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n as u64)
        .map(|id| (id, (0..dim).map(|_| rng.gen_range(0.0..100.0)).collect()))
        .collect()
}

/// Linear scan: every object within `radius` of `query`, sorted by distance then id.
pub fn brute_force_range<P, D: DistanceFunction<P>>(
    objects: &[(ObjectId, P)],
    distance: &D,
    query: &P,
    radius: f64,
) -> Vec<(ObjectId, f64)> {
    let mut hits: Vec<_> = objects
        .iter()
        .map(|(id, object)| (*id, distance.distance(query, object)))
        .filter(|(_, d)| *d <= radius)
        .collect();
    sort_by_distance(&mut hits);
    hits
}

/// Linear scan: the `k` objects closest to `query`, sorted by distance then id.
pub fn brute_force_knn<P, D: DistanceFunction<P>>(
    objects: &[(ObjectId, P)],
    distance: &D,
    query: &P,
    k: usize,
) -> Vec<(ObjectId, f64)> {
    let mut all = brute_force_range(objects, distance, query, f64::INFINITY);
    all.truncate(k);
    all
}

pub fn sort_by_distance(results: &mut [(ObjectId, f64)]) {
    results.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
}

/// Asserts the tree reports no structural problems.
pub fn assert_tree_valid<P: nitrite_mtree::MetricPayload>(tree: &MTree<P>) -> MTreeResult<()> {
    let report = tree.check_integrity()?;
    assert!(
        report.is_valid,
        "integrity check failed: {:#?}",
        report.errors
    );
    assert_eq!(report.entries_found, tree.size());
    Ok(())
}
