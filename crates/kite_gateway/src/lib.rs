//! Gateway for Kite.
//!
//! The gateway merges the declarations of every provider into one graph and
//! answers federated queries against it:
//! - `merge`: Type merging across providers
//! - `schema`: The published GraphQL schema of a merged generation
//! - `registry`: The merged schema cache
//! - `query`: The federated query model
//! - `plan`: Query planning and per-provider request construction
//! - `stitch`: Combining provider answers into one response
//! - `global_id`: Opaque ids that locate a node across providers
//! - `transport`: Reaching providers
//! - `gateway`: The federated resolution driver
//! - `response`: Federated responses and error codes

pub mod config;
pub mod error;
pub mod gateway;
pub mod global_id;
pub mod merge;
pub mod plan;
pub mod query;
pub mod registry;
pub mod response;
pub mod schema;
pub mod stitch;
pub mod transport;

pub use config::GatewayConfig;
pub use error::{GatewayError, GlobalIdError, MergeError, PlanError, TransportError};
pub use gateway::Gateway;
pub use global_id::{GlobalId, PathStep, MAX_GLOBAL_ID_BYTES};
pub use merge::{FieldTarget, MergedField, MergedObjectType, MergedSchema, MergedType};
pub use plan::{Planner, QueryPlan};
pub use query::{FieldSelection, InlineFragment, Query, Selection};
pub use registry::SchemaRegistry;
pub use response::{codes, FieldError, PathSegment, Response};
pub use schema::{GraphSchema, TypeDef, TypeRef};
pub use transport::{LocalTransport, Transport};

pub use tokio_util::sync::CancellationToken;
