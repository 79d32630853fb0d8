//! Node connections and their mutations.
//!
//! A [`NodeConnection`] is a queryable data source that may also create,
//! update and delete nodes. Mutations are addressed by the dotted path of
//! the connection field below the provider root followed by the method name,
//! for example `shop.orders.update`.

use crate::collection::CollectionQuery;
use crate::error::ResolverError;
use crate::object::{metadata, resolve_object, ApiObject, ObjectBuilder};
use crate::resolver::{merge_requests, ResolveContext, Source};
use crate::updater::Patch;
use async_trait::async_trait;
use futures::future::BoxFuture;
use kite_schema::{
    ApiField, ApiMutation, ApiRequest, ConnectionAction, FieldFlags, MutationKind, RequestContext,
    ScalarType, ScalarValue, SecurityLogType, SecurityRecord, Severity,
};
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A page of query results.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    /// Matching items before paging.
    pub count: usize,
    pub items: Vec<T>,
}

/// A field-level problem reported by a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDescription {
    pub field: Option<String>,
    pub message: String,
}

impl ErrorDescription {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

impl ApiObject for ErrorDescription {
    const TYPE_NAME: &'static str = "ErrorDescription";

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder.scalar("field", ScalarType::String, |e: &ErrorDescription| e.field.clone());
        builder.scalar("message", ScalarType::String, |e: &ErrorDescription| e.message.clone());
    }
}

/// The outcome of a mutation.
#[derive(Debug, Clone)]
pub struct MutationResult<T> {
    /// The created, updated or deleted node.
    pub result: Option<T>,
    pub errors: Vec<ErrorDescription>,
}

impl<T> MutationResult<T> {
    pub fn ok(node: T) -> Self {
        Self {
            result: Some(node),
            errors: Vec::new(),
        }
    }

    pub fn failed(error: ErrorDescription) -> Self {
        Self {
            result: None,
            errors: vec![error],
        }
    }
}

/// A data source behind a connection field.
#[async_trait]
pub trait NodeConnection<T: ApiObject>: Send + Sync {
    /// Runs a filtered, sorted and paged query.
    async fn query(
        &self,
        query: &CollectionQuery<T>,
        context: &RequestContext,
    ) -> Result<QueryResult<T>, ResolverError>;

    async fn create(&self, _node: Patch<T>, _context: &RequestContext) -> Result<MutationResult<T>, ResolverError> {
        Err(ResolverError::UnsupportedMutation(MutationKind::Create.method_name().to_string()))
    }

    async fn update(
        &self,
        _id: ScalarValue,
        _patch: Patch<T>,
        _context: &RequestContext,
    ) -> Result<MutationResult<T>, ResolverError> {
        Err(ResolverError::UnsupportedMutation(MutationKind::Update.method_name().to_string()))
    }

    async fn delete(&self, _id: ScalarValue, _context: &RequestContext) -> Result<MutationResult<T>, ResolverError> {
        Err(ResolverError::UnsupportedMutation(MutationKind::Delete.method_name().to_string()))
    }
}

/// An in-memory node connection keyed by the element's key field.
#[derive(Debug, Default)]
pub struct VecConnection<T> {
    items: RwLock<Vec<T>>,
}

impl<T: ApiObject + Clone> VecConnection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// A copy of the current items.
    pub async fn snapshot(&self) -> Vec<T> {
        self.items.read().await.clone()
    }

    fn position(items: &[T], id: &ScalarValue) -> Option<usize> {
        let metadata = metadata::<T>();
        items.iter().position(|item| {
            metadata
                .key_value(item)
                .and_then(|key| key.compare(id))
                .is_some_and(|ordering| ordering.is_eq())
        })
    }
}

#[async_trait]
impl<T: ApiObject + Clone> NodeConnection<T> for VecConnection<T> {
    async fn query(
        &self,
        query: &CollectionQuery<T>,
        _context: &RequestContext,
    ) -> Result<QueryResult<T>, ResolverError> {
        let items = self.items.read().await;
        let (count, page) = query.apply(&items);
        Ok(QueryResult {
            count,
            items: page.into_iter().cloned().collect(),
        })
    }

    async fn create(&self, node: Patch<T>, _context: &RequestContext) -> Result<MutationResult<T>, ResolverError> {
        let node = node.into_value();
        let mut items = self.items.write().await;
        if let Some(key) = metadata::<T>().key_value(&node) {
            if Self::position(&items, &key).is_some() {
                return Ok(MutationResult::failed(ErrorDescription::new("a node with this key already exists")));
            }
        }
        items.push(node.clone());
        Ok(MutationResult::ok(node))
    }

    async fn update(
        &self,
        id: ScalarValue,
        patch: Patch<T>,
        _context: &RequestContext,
    ) -> Result<MutationResult<T>, ResolverError> {
        let mut items = self.items.write().await;
        let Some(index) = Self::position(&items, &id) else {
            return Ok(MutationResult::failed(ErrorDescription::new("node not found")));
        };
        patch.apply_to(&mut items[index]);
        Ok(MutationResult::ok(items[index].clone()))
    }

    async fn delete(&self, id: ScalarValue, _context: &RequestContext) -> Result<MutationResult<T>, ResolverError> {
        let mut items = self.items.write().await;
        match Self::position(&items, &id) {
            Some(index) => Ok(MutationResult::ok(items.remove(index))),
            None => Ok(MutationResult::failed(ErrorDescription::new("node not found"))),
        }
    }
}

fn action_of(kind: MutationKind) -> ConnectionAction {
    match kind {
        MutationKind::Create => ConnectionAction::Create,
        MutationKind::Update => ConnectionAction::Update,
        MutationKind::Delete => ConnectionAction::Delete,
    }
}

/// Gathers published mutations, visiting every type once.
#[derive(Debug, Default)]
pub(crate) struct MutationCollector {
    pub(crate) mutations: Vec<ApiMutation>,
    visited: FxHashSet<&'static str>,
}

impl MutationCollector {
    /// Marks a type as visited; returns false if it already was.
    pub(crate) fn enter(&mut self, type_name: &'static str) -> bool {
        self.visited.insert(type_name)
    }
}

/// A field through which mutations can be reached.
pub(crate) trait MutationTarget: Send + Sync {
    /// Runs a mutation found at `path` below this field of `parent`.
    #[allow(clippy::too_many_arguments)]
    fn mutate<'a>(
        &'a self,
        parent: &'a Source,
        path: &'a [&'a str],
        kind: MutationKind,
        field: &'a ApiField,
        kinds: &'a [MutationKind],
        request: &'a ApiRequest,
        context: &'a ResolveContext<'a>,
    ) -> BoxFuture<'a, Result<Value, ResolverError>>;

    /// Publishes the mutations reachable through this field.
    fn collect(&self, path: &str, field: &ApiField, kinds: &[MutationKind], collector: &mut MutationCollector);
}

type ChildGetter<P, U> = Arc<dyn Fn(&P) -> Option<U> + Send + Sync>;

/// Leads from a parent object into a nested object's fields.
pub(crate) struct NestedMutations<P, U> {
    getter: ChildGetter<P, U>,
}

impl<P, U> NestedMutations<P, U> {
    pub(crate) fn new(getter: impl Fn(&P) -> Option<U> + Send + Sync + 'static) -> Self {
        Self {
            getter: Arc::new(getter),
        }
    }
}

impl<P: ApiObject, U: ApiObject> MutationTarget for NestedMutations<P, U> {
    fn mutate<'a>(
        &'a self,
        parent: &'a Source,
        path: &'a [&'a str],
        kind: MutationKind,
        _field: &'a ApiField,
        _kinds: &'a [MutationKind],
        request: &'a ApiRequest,
        context: &'a ResolveContext<'a>,
    ) -> BoxFuture<'a, Result<Value, ResolverError>> {
        Box::pin(async move {
            let child = parent
                .downcast_ref::<P>()
                .and_then(|parent| (self.getter)(parent))
                .ok_or_else(|| ResolverError::UnknownMutation(request.field_name.clone()))?;
            metadata::<U>().mutate(&child, path, kind, request, context).await
        })
    }

    fn collect(&self, path: &str, _field: &ApiField, _kinds: &[MutationKind], collector: &mut MutationCollector) {
        if collector.enter(U::TYPE_NAME) {
            metadata::<U>().collect_mutations(Some(path), collector);
        }
    }
}

type ConnectionGetter<P, U> = Arc<dyn Fn(&P) -> Arc<dyn NodeConnection<U>> + Send + Sync>;

/// Runs mutations against the node connection behind a field.
pub(crate) struct ConnectionMutations<P, U: ApiObject> {
    getter: ConnectionGetter<P, U>,
    marker: PhantomData<fn() -> U>,
}

impl<P, U: ApiObject> ConnectionMutations<P, U> {
    pub(crate) fn new(getter: impl Fn(&P) -> Arc<dyn NodeConnection<U>> + Send + Sync + 'static) -> Self {
        Self {
            getter: Arc::new(getter),
            marker: PhantomData,
        }
    }
}

impl<P: ApiObject, U: ApiObject + Default> ConnectionMutations<P, U> {
    fn node_id(request: &ApiRequest) -> Result<ScalarValue, ResolverError> {
        let key_type = metadata::<U>()
            .key_binding()
            .map(|binding| binding.field.scalar_type)
            .ok_or_else(|| ResolverError::invalid_argument("id", format!("{} has no key", U::TYPE_NAME)))?;
        let id = request
            .argument("id")
            .ok_or_else(|| ResolverError::invalid_argument("id", "missing"))?;
        ScalarValue::from_json(key_type, id)
            .filter(|id| !id.is_null())
            .ok_or_else(|| ResolverError::invalid_argument("id", format!("expected {}", key_type.graph_name())))
    }

    fn new_node(request: &ApiRequest) -> Result<Patch<U>, ResolverError> {
        let input = request
            .argument("newNode")
            .ok_or_else(|| ResolverError::invalid_argument("newNode", "missing"))?;
        Patch::from_input(input)
    }

    async fn execute(
        &self,
        parent: &P,
        kind: MutationKind,
        request: &ApiRequest,
        context: &RequestContext,
    ) -> Result<MutationResult<U>, ResolverError> {
        let connection = (self.getter)(parent);
        match kind {
            MutationKind::Create => connection.create(Self::new_node(request)?, context).await,
            MutationKind::Update => {
                let id = Self::node_id(request)?;
                connection.update(id, Self::new_node(request)?, context).await
            }
            MutationKind::Delete => connection.delete(Self::node_id(request)?, context).await,
        }
    }

    fn mutation_field(path: &str, kind: MutationKind, field: &ApiField) -> Option<ApiField> {
        let new_node = ApiField::object("newNode", U::TYPE_NAME, FieldFlags::CAN_BE_USED_IN_INPUT).ok()?;
        let id = metadata::<U>()
            .key_binding()
            .and_then(|binding| ApiField::scalar("id", binding.field.scalar_type, FieldFlags::NONE).ok());

        let arguments = match kind {
            MutationKind::Create => vec![new_node],
            MutationKind::Update => vec![id?, new_node],
            MutationKind::Delete => vec![id?],
        };

        let mut mutation = ApiField::object(
            format!("{path}.{}", kind.method_name()),
            U::TYPE_NAME,
            FieldFlags::IS_CONNECTION,
        )
            .ok()?
            .with_arguments(arguments);
        mutation.authorization_rules = field.authorization_rules.clone();
        mutation.log_access_rules = field.log_access_rules.clone();
        mutation.require_authenticated_session = field.require_authenticated_session;
        mutation.require_authenticated_user_session = field.require_authenticated_user_session;
        Some(mutation)
    }
}

/// Builds the provider payload for a finished mutation.
async fn mutation_payload<U: ApiObject>(
    kind: MutationKind,
    outcome: &MutationResult<U>,
    request: &ApiRequest,
    context: &ResolveContext<'_>,
) -> Value {
    let mut payload = Map::new();
    for sub in merge_requests(request.sub_fields()) {
        let value = match sub.field_name.as_str() {
            "result" => match &outcome.result {
                Some(node) => resolve_object(node, sub.sub_fields(), &context.at(sub.response_key())).await,
                None => Value::Null,
            },
            "errors" => {
                let mut errors = Vec::with_capacity(outcome.errors.len());
                for error in &outcome.errors {
                    errors.push(resolve_object(error, sub.sub_fields(), context).await);
                }
                Value::Array(errors)
            }
            "deletedId" => match (kind, &outcome.result) {
                (MutationKind::Delete, Some(node)) => metadata::<U>()
                    .key_value(node)
                    .map(|key| key.to_json())
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            "clientMutationId" => request.argument("clientMutationId").cloned().unwrap_or(Value::Null),
            _ => continue,
        };
        payload.insert(sub.response_key().to_string(), value);
    }
    Value::Object(payload)
}

impl<P: ApiObject, U: ApiObject + Default> MutationTarget for ConnectionMutations<P, U> {
    fn mutate<'a>(
        &'a self,
        parent: &'a Source,
        path: &'a [&'a str],
        kind: MutationKind,
        field: &'a ApiField,
        kinds: &'a [MutationKind],
        request: &'a ApiRequest,
        context: &'a ResolveContext<'a>,
    ) -> BoxFuture<'a, Result<Value, ResolverError>> {
        Box::pin(async move {
            let parent = match parent.downcast_ref::<P>() {
                Some(parent) if path.is_empty() && kinds.contains(&kind) => parent,
                _ => return Err(ResolverError::UnknownMutation(request.field_name.clone())),
            };

            let action = action_of(kind);
            if !field.check_authorization(context.request(), action) {
                context.log(SecurityRecord::new(
                    SecurityLogType::OperationDenied,
                    field.max_log_severity(action).unwrap_or(Severity::Trivial),
                    context.request(),
                    "Unauthorized call to {ApiPath}",
                    vec![request.field_name.clone()],
                ));
                return Err(ResolverError::Unauthorized {
                    field: request.field_name.clone(),
                    action,
                });
            }

            let outcome = self.execute(parent, kind, request, context.request()).await?;

            if outcome.result.is_some() {
                if let Some(rule) = field.matching_log_rule(action) {
                    let arguments = request
                        .arguments
                        .as_ref()
                        .map(Value::to_string)
                        .unwrap_or_default();
                    context.log(SecurityRecord::new(
                        SecurityLogType::granted(action),
                        rule.severity,
                        context.request(),
                        rule.message.clone(),
                        vec![request.field_name.clone(), arguments],
                    ));
                }
            }

            Ok(mutation_payload(kind, &outcome, request, context).await)
        })
    }

    fn collect(&self, path: &str, field: &ApiField, kinds: &[MutationKind], collector: &mut MutationCollector) {
        for &kind in kinds {
            if let Some(mutation) = Self::mutation_field(path, kind, field) {
                collector.mutations.push(ApiMutation { field: mutation, kind });
            }
        }
    }
}
