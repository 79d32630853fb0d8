//! Provider-side resolution for Kite.
//!
//! A provider exposes plain Rust types by implementing [`ApiObject`] and
//! registering their fields once through an [`ObjectBuilder`]. The crate
//! turns those registrations into published declarations and resolves
//! incoming [`kite_schema::ApiRequest`] trees against in-process values:
//! - `resolver`: The `Resolver` trait and the direct value resolvers
//! - `object`: Registration, per-type metadata and the object resolver
//! - `collection`: Filtering, sorting, paging collection resolver
//! - `connection`: Node connections and their mutations
//! - `updater`: Partial updates from mutation input
//! - `provider`: The `ApiProvider` endpoint

pub mod collection;
pub mod connection;
pub mod error;
pub mod object;
pub mod provider;
pub mod resolver;
pub mod updater;

mod registry;

pub use collection::{CollectionQuery, CollectionResolver, CompareOp, Filter, SortCondition};
pub use connection::{ErrorDescription, MutationResult, NodeConnection, QueryResult, VecConnection};
pub use error::ResolverError;
pub use object::{metadata, ApiObject, FieldDecl, ObjectBuilder, ObjectResolver, TypeCollector, TypeMetadata};
pub use provider::ApiProvider;
pub use resolver::{
    merge_requests, ApiEnum, EnumResolver, ErrorSink, ForwardingResolver, NullResolver, ResolveContext, Resolver,
    ResolverFuture, ScalarResolver, SimpleCollectionResolver, Source,
};
pub use updater::{Patch, PatchField};
