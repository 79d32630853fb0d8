//! Query planning.
//!
//! Planning walks a caller's selections against one merged schema
//! generation and produces a typed plan. The plan is read twice: once to
//! build each provider's [`ApiRequest`] tree, and once more while stitching
//! provider answers back into one response.
//!
//! Authorization happens here. A field is asked only from the providers
//! whose declaration admits the caller; a field no provider admits is pruned
//! and exactly one denial record is logged for it.

use crate::error::PlanError;
use crate::global_id::PathStep;
use crate::merge::{FieldTarget, MergedField, MergedMutation, MergedObjectType, MergedSchema, ERROR_TYPE};
use crate::query::{FieldSelection, Query, Selection};
use indexmap::IndexMap;
use kite_schema::{
    ApiField, ApiRequest, ConnectionAction, MutationKind, RequestContext, SecurityLogType, SecurityLogger,
    SecurityRecord, Severity,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Alias under which every keyed object's key is requested.
pub const KEY_ALIAS: &str = "__id";

/// Alias of the key-only `result` request of a mutation.
pub const ID_REQUEST_ALIAS: &str = "__idRequest";

/// The action a mutation kind performs.
pub fn mutation_action(kind: MutationKind) -> ConnectionAction {
    match kind {
        MutationKind::Create => ConnectionAction::Create,
        MutationKind::Update => ConnectionAction::Update,
        MutationKind::Delete => ConnectionAction::Delete,
    }
}

/// A planned federated query.
#[derive(Debug)]
pub struct QueryPlan<'s> {
    pub roots: Vec<RootPlan<'s>>,
}

/// One root selection of a query.
#[derive(Debug)]
pub enum RootPlan<'s> {
    /// The merged `api` subtree; each occurrence is dispatched on its own.
    Api { key: String, plan: ObjectPlan<'s> },
    /// A global-id lookup; planned once the id names its type.
    Node {
        key: String,
        id: Option<String>,
        selections: Vec<Selection>,
    },
    Typename { key: String, name: &'static str },
}

impl QueryPlan<'_> {
    /// Per-provider request lists for every `api` root, in dispatch order.
    pub fn dispatches(&self) -> Vec<(&str, Vec<(String, Vec<ApiRequest>)>)> {
        self.roots
            .iter()
            .filter_map(|root| match root {
                RootPlan::Api { key, plan } => Some((key.as_str(), plan.dispatches())),
                _ => None,
            })
            .collect()
    }
}

/// Selections planned against one merged object.
#[derive(Debug)]
pub struct ObjectPlan<'s> {
    pub object: &'s MergedObjectType,
    pub selections: Vec<Planned<'s>>,
}

/// One response key of an object.
#[derive(Debug)]
pub enum Planned<'s> {
    Typename { key: String },
    /// The node's global id.
    GlobalId { key: String },
    /// The node's raw key.
    RawKey { key: String },
    /// No provider admitted the caller; resolves to null.
    Pruned { key: String },
    Field(FieldPlan<'s>),
}

/// A provider-backed field.
#[derive(Debug)]
pub struct FieldPlan<'s> {
    pub key: String,
    pub field: &'s MergedField,
    pub arguments: Option<Value>,
    /// Providers asked for this field, in merge order.
    pub apis: Vec<&'s str>,
    pub shape: FieldShape<'s>,
}

impl FieldPlan<'_> {
    /// Path step for provenance, untyped arguments only.
    pub fn step(&self) -> PathStep {
        let arguments: BTreeMap<String, Value> = self
            .arguments
            .as_ref()
            .and_then(Value::as_object)
            .map(|args| {
                args.iter()
                    .filter(|(name, _)| self.field.is_plain_argument(name))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        PathStep::new(&self.field.name).with_arguments(arguments)
    }

    fn asks(&self, api: &str) -> bool {
        self.apis.iter().any(|a| *a == api)
    }

    fn request(&self, api: &str) -> ApiRequest {
        let mut request = ApiRequest::new(&self.field.name).with_alias(&self.key);
        if let Some(arguments) = &self.arguments {
            request = request.with_arguments(arguments.clone());
        }
        match &self.shape {
            FieldShape::Leaf => request,
            FieldShape::Object(plan) => request.with_fields(plan.requests(api)),
            FieldShape::Connection(plan) => request.with_fields(plan.requests(api)),
        }
    }
}

#[derive(Debug)]
pub enum FieldShape<'s> {
    Leaf,
    /// A single object, or a list of them when the field is an array.
    Object(ObjectPlan<'s>),
    Connection(ConnectionPlan<'s>),
}

/// Selections on a connection type.
#[derive(Debug)]
pub struct ConnectionPlan<'s> {
    pub type_name: String,
    pub element: &'s MergedObjectType,
    pub items: Vec<ConnectionItem<'s>>,
}

#[derive(Debug)]
pub enum ConnectionItem<'s> {
    Count { key: String },
    Typename { key: String, name: String },
    Edges { key: String, edge: EdgePlan<'s> },
}

/// Selections on an edge type.
#[derive(Debug)]
pub struct EdgePlan<'s> {
    pub element: &'s MergedObjectType,
    pub items: Vec<EdgeItem<'s>>,
}

#[derive(Debug)]
pub enum EdgeItem<'s> {
    Cursor { key: String },
    Typename { key: String, name: String },
    Node { key: String, plan: ObjectPlan<'s> },
}

impl<'s> ObjectPlan<'s> {
    /// Requests for `api`, with the key aliased `__id` when the object has one.
    pub fn requests(&self, api: &str) -> Vec<ApiRequest> {
        let mut requests = Vec::new();
        if let Some(key) = self.object.key_for(api) {
            requests.push(ApiRequest::new(key).with_alias(KEY_ALIAS));
        }
        requests.extend(self.field_requests(api));
        requests
    }

    /// Requests for `api` without the key.
    pub fn field_requests(&self, api: &str) -> Vec<ApiRequest> {
        self.fields()
            .filter(|field| field.asks(api))
            .map(|field| field.request(api))
            .collect()
    }

    /// Every provider with something to answer, with its root requests.
    pub fn dispatches(&self) -> Vec<(String, Vec<ApiRequest>)> {
        self.object
            .apis()
            .filter_map(|api| {
                let requests = self.field_requests(api);
                (!requests.is_empty()).then(|| (api.to_string(), requests))
            })
            .collect()
    }

    /// Maps a path of provider response keys onto caller response keys.
    ///
    /// Object fields map one to one. The walk stops at the first connection
    /// or list, since element positions do not survive concatenation.
    pub fn response_path<'p>(&self, provider_path: &'p [String]) -> Vec<&'p str> {
        let mut keys = Vec::new();
        let mut current = self;
        for segment in provider_path {
            let Some(field) = current.fields().find(|field| field.key == *segment) else {
                break;
            };
            keys.push(segment.as_str());
            match &field.shape {
                FieldShape::Object(plan) if !field.field.is_array() => current = plan,
                _ => break,
            }
        }
        keys
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldPlan<'s>> {
        self.selections.iter().filter_map(|planned| match planned {
            Planned::Field(field) => Some(field),
            _ => None,
        })
    }
}

impl ConnectionPlan<'_> {
    fn requests(&self, api: &str) -> Vec<ApiRequest> {
        let mut requests = Vec::new();
        if self.items.iter().any(|item| matches!(item, ConnectionItem::Count { .. })) {
            requests.push(ApiRequest::new("count"));
        }
        for item in &self.items {
            if let ConnectionItem::Edges { key, edge } = item {
                requests.push(
                    ApiRequest::new("items")
                        .with_alias(key)
                        .with_fields(edge.requests(api)),
                );
            }
        }
        requests
    }
}

impl EdgePlan<'_> {
    /// Key plus every requested node field, aliased `{nodeKey}.{alias}`.
    pub fn requests(&self, api: &str) -> Vec<ApiRequest> {
        let mut requests = Vec::new();
        if let Some(key) = self.element.key_for(api) {
            requests.push(ApiRequest::new(key).with_alias(KEY_ALIAS));
        }
        for item in &self.items {
            if let EdgeItem::Node { key, plan } = item {
                for request in plan.field_requests(api) {
                    let alias = node_alias(key, request.response_key());
                    requests.push(request.with_alias(alias));
                }
            }
        }
        requests
    }
}

/// Provider-side alias of a node field inside a connection item.
///
/// `.` never occurs in a caller alias, so distinct node keys cannot collide.
pub fn node_alias(node_key: &str, alias: &str) -> String {
    format!("{node_key}.{alias}")
}

/// A planned mutation request.
#[derive(Debug)]
pub struct MutationPlan<'s> {
    pub roots: Vec<MutationRoot<'s>>,
}

#[derive(Debug)]
pub enum MutationRoot<'s> {
    Typename { key: String },
    Field(MutationFieldPlan<'s>),
}

/// One mutation field, executed as one provider request.
#[derive(Debug)]
pub struct MutationFieldPlan<'s> {
    pub key: String,
    pub mutation: &'s MergedMutation,
    /// The caller's `input` object.
    pub input: Map<String, Value>,
    /// False when the gateway refused the mutation.
    pub authorized: bool,
    pub payload: PayloadPlan<'s>,
}

impl MutationFieldPlan<'_> {
    /// The provider request for this mutation.
    pub fn request(&self) -> ApiRequest {
        let api = self.mutation.api.as_str();
        let element = self.payload.element;
        let mut fields = Vec::new();
        if let Some(key) = element.key_for(api) {
            fields.push(
                ApiRequest::new("result")
                    .with_alias(ID_REQUEST_ALIAS)
                    .with_fields(vec![ApiRequest::new(key).with_alias(KEY_ALIAS)]),
            );
        }
        for item in &self.payload.items {
            match item {
                PayloadItem::Node { key, plan } => {
                    fields.push(ApiRequest::new("result").with_alias(key).with_fields(plan.requests(api)));
                }
                PayloadItem::Edge { key, edge } => {
                    fields.push(ApiRequest::new("result").with_alias(key).with_fields(edge.requests(api)));
                }
                PayloadItem::Errors { key, .. } => {
                    fields.push(
                        ApiRequest::new("errors")
                            .with_alias(key)
                            .with_fields(vec![ApiRequest::new("field"), ApiRequest::new("message")]),
                    );
                }
                PayloadItem::DeletedId { key } => {
                    fields.push(ApiRequest::new("deletedId").with_alias(key));
                }
                _ => {}
            }
        }

        let mut arguments = self.input.clone();
        arguments.remove("clientMutationId");
        ApiRequest::new(&self.mutation.field.name)
            .with_alias(&self.key)
            .with_arguments(Value::Object(arguments))
            .with_fields(fields)
    }

    /// Provenance of the container connection, the last step without an id.
    pub fn container_path(&self) -> Vec<PathStep> {
        self.mutation.container_path.iter().map(PathStep::new).collect()
    }
}

/// Selections on a mutation payload.
#[derive(Debug)]
pub struct PayloadPlan<'s> {
    pub element: &'s MergedObjectType,
    pub items: Vec<PayloadItem<'s>>,
}

#[derive(Debug)]
pub enum PayloadItem<'s> {
    Typename { key: String, name: String },
    Node { key: String, plan: ObjectPlan<'s> },
    Edge { key: String, edge: EdgePlan<'s> },
    /// Requested keys of each error, paired with the error field they read.
    Errors { key: String, fields: Vec<(String, String)> },
    DeletedId { key: String },
    ClientMutationId { key: String },
    /// The federated graph, queried again after the mutation.
    Api { key: String, plan: ObjectPlan<'s> },
}

/// Builds plans against one merged schema for one caller.
pub struct Planner<'s> {
    schema: &'s MergedSchema,
    context: &'s RequestContext,
    security: &'s dyn SecurityLogger,
    node_field: &'s str,
}

impl<'s> Planner<'s> {
    pub fn new(
        schema: &'s MergedSchema,
        context: &'s RequestContext,
        security: &'s dyn SecurityLogger,
        node_field: &'s str,
    ) -> Self {
        Self {
            schema,
            context,
            security,
            node_field,
        }
    }

    /// Plans the root selections of a query.
    pub fn plan_query(&self, query: &Query) -> Result<QueryPlan<'s>, PlanError> {
        let mut roots = Vec::new();
        for (key, selection) in collect_fields(&query.selections, &|c| c == "Query") {
            let root = match selection.name.as_str() {
                "__typename" => RootPlan::Typename { key, name: "Query" },
                "api" => RootPlan::Api {
                    key,
                    plan: self.plan_object(self.api()?, &selection.selections)?,
                },
                name if name == self.node_field => RootPlan::Node {
                    key,
                    id: selection
                        .arguments
                        .as_ref()
                        .and_then(|args| args.get("id"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    selections: selection.selections,
                },
                _ => return Err(unknown("Query", &selection.name)),
            };
            roots.push(root);
        }
        Ok(QueryPlan { roots })
    }

    /// Plans the root selections of a mutation request.
    pub fn plan_mutation(&self, query: &Query) -> Result<MutationPlan<'s>, PlanError> {
        let mut roots = Vec::new();
        for (key, selection) in collect_fields(&query.selections, &|c| c == "Mutation") {
            if selection.name == "__typename" {
                roots.push(MutationRoot::Typename { key });
                continue;
            }
            let mutation = self
                .schema
                .mutation(&selection.name)
                .ok_or_else(|| unknown("Mutation", &selection.name))?;
            let element = self.object(&mutation.element)?;

            let action = mutation_action(mutation.kind);
            let authorized = mutation.field.check_authorization(self.context, action);
            if !authorized {
                self.log_denial(std::iter::once(&mutation.field), action, format!("{}.{}", mutation.api, mutation.field.name));
            }

            let input = selection
                .arguments
                .as_ref()
                .and_then(|args| args.get("input"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();

            roots.push(MutationRoot::Field(MutationFieldPlan {
                key,
                mutation,
                input,
                authorized,
                payload: self.plan_payload(&mutation.payload_type, element, &selection.selections)?,
            }));
        }
        Ok(MutationPlan { roots })
    }

    /// Plans selections against a merged object.
    pub fn plan_object(&self, object: &'s MergedObjectType, selections: &[Selection]) -> Result<ObjectPlan<'s>, PlanError> {
        let mut planned = Vec::new();
        for (key, selection) in collect_fields(selections, &|c| object.matches_condition(c)) {
            let name = selection.name.as_str();
            if key == KEY_ALIAS && name != KEY_ALIAS {
                continue;
            }
            let entry = match name {
                "__typename" => Planned::Typename { key },
                "id" if object.has_key() => Planned::GlobalId { key },
                KEY_ALIAS if object.has_key() => Planned::RawKey { key },
                _ => {
                    let field = object
                        .fields
                        .get(name)
                        .ok_or_else(|| unknown(&object.complex_name, name))?;
                    self.plan_field(object, field, key, selection)?
                }
            };
            planned.push(entry);
        }
        Ok(ObjectPlan {
            object,
            selections: planned,
        })
    }

    fn plan_field(
        &self,
        owner: &MergedObjectType,
        field: &'s MergedField,
        key: String,
        selection: FieldSelection,
    ) -> Result<Planned<'s>, PlanError> {
        let apis: Vec<&'s str> = field
            .sources
            .iter()
            .filter(|source| source.field.check_authorization(self.context, ConnectionAction::Query))
            .map(|source| source.api.as_str())
            .collect();
        if apis.is_empty() {
            self.log_denial(
                field.sources.iter().map(|s| &s.field),
                ConnectionAction::Query,
                format!("{}.{}", owner.original_type_name, field.name),
            );
            return Ok(Planned::Pruned { key });
        }

        let shape = match &field.target {
            FieldTarget::Object(name) => {
                let element = self.object(name)?;
                if field.is_connection() {
                    FieldShape::Connection(self.plan_connection(element, &selection.selections)?)
                } else {
                    FieldShape::Object(self.plan_object(element, &selection.selections)?)
                }
            }
            FieldTarget::Scalar(_) | FieldTarget::Enum(_) => FieldShape::Leaf,
        };

        Ok(Planned::Field(FieldPlan {
            key,
            field,
            arguments: selection.arguments,
            apis,
            shape,
        }))
    }

    fn plan_connection(
        &self,
        element: &'s MergedObjectType,
        selections: &[Selection],
    ) -> Result<ConnectionPlan<'s>, PlanError> {
        let type_name = format!("{}_Connection", element.complex_name);
        let mut items = Vec::new();
        for (key, selection) in collect_fields(selections, &|c| c == type_name) {
            items.push(match selection.name.as_str() {
                "count" => ConnectionItem::Count { key },
                "__typename" => ConnectionItem::Typename {
                    key,
                    name: type_name.clone(),
                },
                "edges" => ConnectionItem::Edges {
                    key,
                    edge: self.plan_edge(element, &selection.selections)?,
                },
                other => return Err(unknown(&type_name, other)),
            });
        }
        Ok(ConnectionPlan {
            type_name,
            element,
            items,
        })
    }

    fn plan_edge(&self, element: &'s MergedObjectType, selections: &[Selection]) -> Result<EdgePlan<'s>, PlanError> {
        let type_name = format!("{}_Edge", element.complex_name);
        let mut items = Vec::new();
        for (key, selection) in collect_fields(selections, &|c| c == type_name) {
            items.push(match selection.name.as_str() {
                "cursor" => EdgeItem::Cursor { key },
                "__typename" => EdgeItem::Typename {
                    key,
                    name: type_name.clone(),
                },
                "node" => EdgeItem::Node {
                    key,
                    plan: self.plan_object(element, &selection.selections)?,
                },
                other => return Err(unknown(&type_name, other)),
            });
        }
        Ok(EdgePlan { element, items })
    }

    fn plan_payload(
        &self,
        type_name: &str,
        element: &'s MergedObjectType,
        selections: &[Selection],
    ) -> Result<PayloadPlan<'s>, PlanError> {
        let mut items = Vec::new();
        for (key, selection) in collect_fields(selections, &|c| c == type_name) {
            items.push(match selection.name.as_str() {
                "__typename" => PayloadItem::Typename {
                    key,
                    name: type_name.to_string(),
                },
                "node" => PayloadItem::Node {
                    key,
                    plan: self.plan_object(element, &selection.selections)?,
                },
                "edge" => PayloadItem::Edge {
                    key,
                    edge: self.plan_edge(element, &selection.selections)?,
                },
                "errors" => {
                    let mut fields = Vec::new();
                    for (error_key, error_field) in collect_fields(&selection.selections, &|c| c == ERROR_TYPE) {
                        match error_field.name.as_str() {
                            "field" | "message" | "__typename" => fields.push((error_key, error_field.name)),
                            other => return Err(unknown(ERROR_TYPE, other)),
                        }
                    }
                    PayloadItem::Errors { key, fields }
                }
                "deletedId" => PayloadItem::DeletedId { key },
                "clientMutationId" => PayloadItem::ClientMutationId { key },
                "api" => PayloadItem::Api {
                    key,
                    plan: self.plan_object(self.api()?, &selection.selections)?,
                },
                other => return Err(unknown(type_name, other)),
            });
        }
        Ok(PayloadPlan { element, items })
    }

    /// Plans the selections of a node located by global id.
    pub fn plan_node(&self, object: &'s MergedObjectType, selections: &[Selection]) -> Result<ObjectPlan<'s>, PlanError> {
        self.plan_object(object, selections)
    }

    fn log_denial<'f>(&self, fields: impl Iterator<Item = &'f ApiField>, action: ConnectionAction, path: String) {
        let severity = fields
            .filter_map(|field| field.max_log_severity(action))
            .max()
            .unwrap_or(Severity::Trivial);
        tracing::debug!(%path, %action, "field pruned, caller not authorized");
        self.security.record(SecurityRecord::new(
            SecurityLogType::OperationDenied,
            severity,
            self.context,
            "Unauthorized call to {ApiPath}",
            vec![path],
        ));
    }

    fn api(&self) -> Result<&'s MergedObjectType, PlanError> {
        self.schema.api().ok_or_else(|| unknown("Query", "api"))
    }

    fn object(&self, name: &str) -> Result<&'s MergedObjectType, PlanError> {
        self.schema.object(name).ok_or_else(|| PlanError::UnknownType(name.to_string()))
    }
}

fn unknown(type_name: &str, field: &str) -> PlanError {
    PlanError::UnknownField {
        type_name: type_name.to_string(),
        field: field.to_string(),
    }
}

/// Flattens applicable fragments and merges fields sharing a response key.
///
/// The first occurrence of a key keeps its name and arguments; later
/// occurrences add their sub-selections.
pub fn collect_fields(selections: &[Selection], applies: &dyn Fn(&str) -> bool) -> IndexMap<String, FieldSelection> {
    let mut fields = IndexMap::new();
    collect_into(selections, applies, &mut fields);
    fields
}

fn collect_into(
    selections: &[Selection],
    applies: &dyn Fn(&str) -> bool,
    fields: &mut IndexMap<String, FieldSelection>,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                fields
                    .entry(field.response_key().to_string())
                    .and_modify(|existing: &mut FieldSelection| {
                        existing.selections.extend(field.selections.iter().cloned());
                    })
                    .or_insert_with(|| field.clone());
            }
            Selection::InlineFragment(fragment) => {
                let matches = fragment.type_condition.as_deref().map_or(true, applies);
                if matches {
                    collect_into(&fragment.selections, applies, fields);
                }
            }
        }
    }
}
