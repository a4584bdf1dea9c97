//! MetricIndex trait definition for similarity search.

use crate::disk_mtree::{MTreeResult, ObjectId};

/// A metric index over objects of type `P`.
///
/// Objects are identified by an [`ObjectId`] chosen by the caller; the index
/// only relies on the distance between payloads. Query results are
/// `(id, distance)` pairs sorted by distance, ties by id.
pub trait MetricIndex<P>: Send + Sync {
    /// Adds an object to the index.
    fn insert(&self, id: ObjectId, object: P) -> MTreeResult<()>;

    /// Adds many objects; the result is the same as inserting them one by one.
    fn insert_bulk(&self, objects: Vec<(ObjectId, P)>) -> MTreeResult<()>;

    /// Removes the object with the given id. The payload guides the search,
    /// so it must be the one the object was inserted with.
    ///
    /// Returns `false` if no such object is indexed.
    fn delete(&self, id: ObjectId, object: &P) -> MTreeResult<bool>;

    /// Finds all objects within `radius` of `query`.
    fn range_query(&self, query: &P, radius: f64) -> MTreeResult<Vec<(ObjectId, f64)>>;

    /// Finds at most `k` nearest objects to `query` that lie within `max_distance`.
    fn nearest_neighbors_within(
        &self,
        query: &P,
        k: usize,
        max_distance: f64,
    ) -> MTreeResult<Vec<(ObjectId, f64)>>;

    /// Finds the `k` nearest objects to `query`.
    fn nearest_neighbors(&self, query: &P, k: usize) -> MTreeResult<Vec<(ObjectId, f64)>> {
        self.nearest_neighbors_within(query, k, f64::INFINITY)
    }

    /// Gets the number of indexed objects.
    fn size(&self) -> u64;

    /// Closes this index, flushing all pending changes.
    fn close(&self) -> MTreeResult<()>;
}
