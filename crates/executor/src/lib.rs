//! Vectorized query execution: physical operators pulling chunks through a
//! tree, the aggregation hash tables behind group-by, the fused
//! top-N-by-count operator, the materialized-view creator, and the bulk
//! loader.
//!
//! Control flows `open -> repeated next(chunk) -> close`; each operator owns
//! its children and forwards the lifecycle.

mod builder;
mod filter;
mod group_by;
mod hash_linear;
mod hash_specialized;
mod hash_standard;
mod limit;
mod load_data;
mod matview;
mod order_by;
mod project;
mod scan;
mod top_count;

pub use builder::build_physical;
pub use filter::FilterVec;
pub use group_by::GroupByVec;
pub use hash_linear::{LinearProbingAggTable, ProbeValue, EMPTY_KEY};
pub use hash_specialized::{
    build_specialized, GroupKey, GroupKeyPart, SpecializedAggTable, SpecializedTable,
};
pub use hash_standard::StandardAggregateHashTable;
pub use limit::LimitVec;
pub use load_data::LoadDataExecutor;
pub use matview::CreateMaterializedViewVec;
pub use order_by::{OrderByLimitVec, OrderByVec, OrderComparator, SortKey};
pub use project::ProjectVec;
pub use scan::TableScanVec;
pub use top_count::TopCountVec;

use columnar::Chunk;
use common::DbResult;
use std::sync::Arc;
use storage::Table;
use types::AttrType;

/// The pull contract every physical operator implements.
pub trait PhysicalOperator: Send {
    fn open(&mut self) -> DbResult<()>;

    /// Produce the next batch into `chunk`. Returns `false` once exhausted.
    fn next(&mut self, chunk: &mut Chunk) -> DbResult<bool>;

    fn close(&mut self) -> DbResult<()>;

    /// Output column names, in order.
    fn schema(&self) -> &[String];
}

/// Schema operations the executor needs from its host: resolving tables and
/// creating the destination of a materialized view.
pub trait SchemaOps: Send + Sync {
    fn find_table(&self, name: &str) -> DbResult<Arc<Table>>;

    /// Create a PAX table for a materialized view; fails with the view-name
    /// code when the name is taken.
    fn create_pax_table(
        &self,
        name: &str,
        attrs: Vec<(String, AttrType, usize)>,
    ) -> DbResult<Arc<Table>>;
}
