//! Storage layer - embedded graph engine adapter.

pub mod batch;
pub mod graph_store;
pub mod params;
pub mod rows;
pub mod schema;

pub use batch::{BatchReport, Scheduler, TokioScheduler};
pub use graph_store::{BulkLoadOutcome, DiagnosticReport, EngineState, GraphStats, GraphStore};
pub use params::{BoundStatement, ParamValue, Params};
pub use rows::{Direction, FromRow, Neighbor, QueryResult, StoredNode};
pub use schema::{NODE_TABLE, RELATION_TABLE};
