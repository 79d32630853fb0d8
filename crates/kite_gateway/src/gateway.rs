//! The federated resolution driver.
//!
//! A [`Gateway`] owns the schema cache and answers federated queries and
//! mutations. Each request runs `Planning → Dispatching → Stitching`: the
//! query is planned against the current merged schema, per-provider requests
//! are sent concurrently, and the answers are stitched into one response.
//! A failing provider only nulls its own part of the response.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, PlanError, TransportError};
use crate::global_id::{GlobalId, PathStep};
use crate::merge::{MergedObjectType, MergedSchema};
use crate::plan::{MutationFieldPlan, MutationRoot, ObjectPlan, PayloadItem, Planner, RootPlan, KEY_ALIAS};
use crate::query::{Query, Selection};
use crate::registry::SchemaRegistry;
use crate::response::{codes, FieldError, PathSegment, Response};
use crate::schema::GraphSchema;
use crate::stitch::{stitch_object, stitch_payload, Fragment};
use crate::transport::Transport;
use futures::future::join_all;
use kite_schema::{ApiRequest, RequestContext, ResolutionError, SecurityLogger, TracingSecurityLogger};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// How a global id step was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepKind {
    Connection,
    Array,
    Object,
}

/// The federated gateway.
pub struct Gateway {
    transport: Arc<dyn Transport>,
    config: GatewayConfig,
    registry: SchemaRegistry,
    security: Arc<dyn SecurityLogger>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(transport: impl Transport + 'static, config: GatewayConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            registry: SchemaRegistry::new(),
            security: Arc::new(TracingSecurityLogger),
        }
    }

    /// Replaces the security log sink.
    #[must_use]
    pub fn with_security_logger(mut self, logger: Arc<dyn SecurityLogger>) -> Self {
        self.security = logger;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Fetches provider descriptions and publishes a new generation if they changed.
    pub async fn refresh(&self) -> Result<Arc<MergedSchema>, GatewayError> {
        let descriptions = self.transport.descriptions().await?;
        Ok(self.registry.refresh(&descriptions).await?)
    }

    /// The current merged schema generation.
    pub async fn merged_schema(&self) -> Option<Arc<MergedSchema>> {
        self.registry.current().await
    }

    /// The current published schema.
    pub async fn schema(&self) -> Option<GraphSchema> {
        let merged = self.registry.current().await?;
        Some(GraphSchema::from_merged(&merged, &self.config))
    }

    /// Resolves a federated query.
    pub async fn resolve_query(&self, query: &Query, context: &RequestContext) -> Response {
        let span = tracing::info_span!(
            "federated_query",
            request_id = context.request_id.as_deref().unwrap_or("-")
        );
        self.run_query(query, context).instrument(span).await
    }

    /// Resolves a federated query unless `token` is cancelled first.
    ///
    /// On cancellation, pending provider calls are dropped and nothing is
    /// stitched.
    pub async fn resolve_query_with_cancellation(
        &self,
        query: &Query,
        context: &RequestContext,
        token: &CancellationToken,
    ) -> Response {
        tokio::select! {
            biased;
            () = token.cancelled() => cancelled(),
            response = self.resolve_query(query, context) => response,
        }
    }

    /// Executes mutation fields one after another.
    pub async fn resolve_mutation(&self, query: &Query, context: &RequestContext) -> Response {
        let span = tracing::info_span!(
            "federated_mutation",
            request_id = context.request_id.as_deref().unwrap_or("-")
        );
        self.run_mutation(query, context).instrument(span).await
    }

    pub async fn resolve_mutation_with_cancellation(
        &self,
        query: &Query,
        context: &RequestContext,
        token: &CancellationToken,
    ) -> Response {
        tokio::select! {
            biased;
            () = token.cancelled() => cancelled(),
            response = self.resolve_mutation(query, context) => response,
        }
    }

    async fn run_query(&self, query: &Query, context: &RequestContext) -> Response {
        let Some(schema) = self.registry.current().await else {
            return unavailable();
        };
        if let Err(error) = self.check_depth(query) {
            return plan_failure(&error);
        }

        let planner = Planner::new(&schema, context, self.security.as_ref(), &self.config.node_field);
        let plan = match planner.plan_query(query) {
            Ok(plan) => plan,
            Err(error) => return plan_failure(&error),
        };
        tracing::debug!(generation = schema.generation(), roots = plan.roots.len(), "query planned");

        let (planner, schema) = (&planner, &schema);
        let roots = plan.roots.iter().map(|root| async move {
            match root {
                RootPlan::Typename { key, name } => (key.clone(), Value::String((*name).to_string()), Vec::new()),
                RootPlan::Api { key, plan } => {
                    let (value, errors) = self.resolve_api(vec![key.as_str().into()], plan, context).await;
                    (key.clone(), value, errors)
                }
                RootPlan::Node { key, id, selections } => {
                    let (value, errors) = self
                        .resolve_node(planner, schema, key, id.as_deref(), selections, context)
                        .await;
                    (key.clone(), value, errors)
                }
            }
        });

        let mut data = Map::new();
        let mut errors = Vec::new();
        for (key, value, root_errors) in join_all(roots).await {
            data.insert(key, value);
            errors.extend(root_errors);
        }
        Response::data(Value::Object(data)).with_errors(errors)
    }

    async fn run_mutation(&self, query: &Query, context: &RequestContext) -> Response {
        let Some(schema) = self.registry.current().await else {
            return unavailable();
        };
        if let Err(error) = self.check_depth(query) {
            return plan_failure(&error);
        }

        let planner = Planner::new(&schema, context, self.security.as_ref(), &self.config.node_field);
        let plan = match planner.plan_mutation(query) {
            Ok(plan) => plan,
            Err(error) => return plan_failure(&error),
        };

        let mut data = Map::new();
        let mut errors = Vec::new();
        for root in &plan.roots {
            match root {
                MutationRoot::Typename { key } => {
                    data.insert(key.clone(), Value::String("Mutation".to_string()));
                }
                MutationRoot::Field(field) => {
                    let (value, field_errors) = self.execute_mutation(field, context).await;
                    data.insert(field.key.clone(), value);
                    errors.extend(field_errors);
                }
            }
        }
        Response::data(Value::Object(data)).with_errors(errors)
    }

    /// Dispatches one `api` subtree to every provider concerned and stitches the answers.
    async fn resolve_api(
        &self,
        path: Vec<PathSegment>,
        plan: &ObjectPlan<'_>,
        context: &RequestContext,
    ) -> (Value, Vec<FieldError>) {
        let dispatches = plan.dispatches();
        let calls = dispatches.iter().map(|(api, requests)| async move {
            tracing::debug!(api = %api, requests = requests.len(), "dispatching provider query");
            let answer = self
                .bounded(api, self.transport.send_query(api, requests, context))
                .await;
            (api.as_str(), answer)
        });
        let mut answers = join_all(calls).await;

        let mut errors = Vec::new();
        for (api, answer) in &mut answers {
            match answer {
                Ok(value) => {
                    for error in ResolutionError::take_from(value) {
                        let mut error_path = path.clone();
                        error_path.extend(plan.response_path(&error.path).into_iter().map(PathSegment::from));
                        errors.push(resolution_failed(error_path, api, error));
                    }
                }
                Err(error) => {
                    tracing::warn!(api = %api, %error, "provider query failed");
                    errors.push(provider_unavailable(path.clone(), api, error));
                }
            }
        }
        let fragments: Vec<Fragment<'_>> = answers
            .iter()
            .filter_map(|(api, answer)| answer.as_ref().ok().map(|value| Fragment::root(api, value)))
            .collect();
        (stitch_object(plan, &fragments), errors)
    }

    /// Locates a node by global id, asking only the provider named in the id.
    async fn resolve_node<'s>(
        &self,
        planner: &Planner<'s>,
        schema: &'s MergedSchema,
        key: &str,
        id: Option<&str>,
        selections: &[Selection],
        context: &RequestContext,
    ) -> (Value, Vec<FieldError>) {
        let path = vec![PathSegment::from(key)];
        let global = match id.map(GlobalId::decode) {
            Some(Ok(global)) => global,
            Some(Err(error)) => {
                let error = FieldError::new(format!("invalid global id: {error}"))
                    .with_path(path)
                    .with_code(codes::INVALID_GLOBAL_ID);
                return (Value::Null, vec![error]);
            }
            None => {
                let error = FieldError::new("missing global id")
                    .with_path(path)
                    .with_code(codes::INVALID_GLOBAL_ID);
                return (Value::Null, vec![error]);
            }
        };

        let Some((object, kinds)) = locate(schema, &global) else {
            return (Value::Null, vec![not_found(path)]);
        };
        let plan = match planner.plan_node(object, selections) {
            Ok(plan) => plan,
            Err(error) => {
                let code = plan_error_code(&error);
                return (Value::Null, vec![FieldError::new(error.to_string()).with_path(path).with_code(code)]);
            }
        };

        let requests = replay_requests(schema, &global, &kinds, plan.requests(&global.api));
        tracing::debug!(api = %global.api, steps = global.path.len(), "replaying global id");
        let answer = self
            .bounded(&global.api, self.transport.send_query(&global.api, &requests, context))
            .await;
        let mut response = match answer {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(api = %global.api, %error, "node lookup failed");
                return (Value::Null, vec![provider_unavailable(path, &global.api, &error)]);
            }
        };
        // The replayed path has no counterpart in the caller's selection.
        let errors: Vec<FieldError> = ResolutionError::take_from(&mut response)
            .into_iter()
            .map(|error| resolution_failed(path.clone(), &global.api, error))
            .collect();

        match extract_node(&response, &global.path, &kinds) {
            Some(node) => {
                let fragment = Fragment {
                    api: &global.api,
                    value: node,
                    path: global.path.clone(),
                };
                (stitch_object(&plan, &[fragment]), errors)
            }
            None => (Value::Null, vec![not_found(path)]),
        }
    }

    async fn execute_mutation(&self, field: &MutationFieldPlan<'_>, context: &RequestContext) -> (Value, Vec<FieldError>) {
        if !field.authorized {
            return (Value::Null, Vec::new());
        }
        let api = field.mutation.api.as_str();
        let request = field.request();
        tracing::debug!(api, mutation = %field.mutation.name, "dispatching mutation");

        let mut response = match self
            .bounded(api, self.transport.send_mutation(api, &request, context))
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(api, %error, "mutation failed");
                let error = FieldError::new(format!("mutation `{}` failed: {error}", field.mutation.name))
                    .with_path(vec![field.key.as_str().into()])
                    .with_code(codes::MUTATION_FAILED)
                    .with_provider(api);
                return (Value::Null, vec![error]);
            }
        };

        let mut errors: Vec<FieldError> = ResolutionError::take_from(&mut response)
            .into_iter()
            .map(|error| resolution_failed(vec![field.key.as_str().into()], api, error))
            .collect();
        let mut payload = stitch_payload(field, &response);
        for item in &field.payload.items {
            if let PayloadItem::Api { key, plan } = item {
                let path = vec![field.key.as_str().into(), key.as_str().into()];
                let (value, api_errors) = self.resolve_api(path, plan, context).await;
                payload.insert(key.clone(), value);
                errors.extend(api_errors);
            }
        }
        (Value::Object(payload), errors)
    }

    /// Applies the configured dispatch timeout to one provider call.
    async fn bounded<F>(&self, api: &str, call: F) -> Result<Value, TransportError>
    where
        F: Future<Output = Result<Value, TransportError>>,
    {
        match self.config.dispatch_timeout {
            Some(after) => tokio::time::timeout(after, call).await.unwrap_or_else(|_| {
                Err(TransportError::Timeout {
                    api: api.to_string(),
                    after,
                })
            }),
            None => call.await,
        }
    }

    fn check_depth(&self, query: &Query) -> Result<(), PlanError> {
        match self.config.max_depth {
            Some(limit) if query.depth() > limit => Err(PlanError::MaxDepthExceeded {
                depth: query.depth(),
                limit,
            }),
            _ => Ok(()),
        }
    }
}

/// Walks a global id through the merged graph.
///
/// Returns the node's merged type and how each step was reached, or `None`
/// if the path does not exist for the id's provider.
fn locate<'s>(schema: &'s MergedSchema, global: &GlobalId) -> Option<(&'s MergedObjectType, Vec<StepKind>)> {
    let mut object = schema.api()?;
    let mut kinds = Vec::with_capacity(global.path.len());
    for step in &global.path {
        let field = object.fields.get(&step.field)?;
        field.source(&global.api)?;
        object = schema.object(field.object_type()?)?;
        let kind = if field.is_connection() {
            StepKind::Connection
        } else if field.is_array() {
            StepKind::Array
        } else {
            StepKind::Object
        };
        if kind != StepKind::Object && step.id.is_none() {
            return None;
        }
        kinds.push(kind);
    }
    Some((object, kinds))
}

/// Wraps the node requests in one request per path step, innermost last.
fn replay_requests(
    schema: &MergedSchema,
    global: &GlobalId,
    kinds: &[StepKind],
    node_requests: Vec<ApiRequest>,
) -> Vec<ApiRequest> {
    let mut inner = node_requests;
    let mut owners = Vec::with_capacity(global.path.len());
    let mut object = schema.api();
    for step in &global.path {
        let next = object
            .and_then(|o| o.fields.get(&step.field))
            .and_then(|f| f.object_type())
            .and_then(|name| schema.object(name));
        owners.push(next);
        object = next;
    }

    for (index, (step, kind)) in global.path.iter().zip(kinds).enumerate().rev() {
        let is_last = index + 1 == global.path.len();
        let request = ApiRequest::new(&step.field);
        let request = match kind {
            StepKind::Connection => {
                let request = match step.replay_arguments() {
                    Some(arguments) => request.with_arguments(arguments),
                    None => request,
                };
                request.with_fields(vec![ApiRequest::new("items").with_fields(keyed(inner, owners[index], &global.api, is_last))])
            }
            StepKind::Array => {
                let request = match plain_arguments(step) {
                    Some(arguments) => request.with_arguments(arguments),
                    None => request,
                };
                request.with_fields(keyed(inner, owners[index], &global.api, is_last))
            }
            StepKind::Object => {
                let request = match plain_arguments(step) {
                    Some(arguments) => request.with_arguments(arguments),
                    None => request,
                };
                request.with_fields(inner)
            }
        };
        inner = vec![request];
    }
    inner
}

/// Adds the key request to an intermediate element; the node's own requests carry it already.
fn keyed(
    mut requests: Vec<ApiRequest>,
    owner: Option<&MergedObjectType>,
    api: &str,
    is_last: bool,
) -> Vec<ApiRequest> {
    if !is_last {
        if let Some(key) = owner.and_then(|o| o.key_for(api)) {
            requests.push(ApiRequest::new(key).with_alias(KEY_ALIAS));
        }
    }
    requests
}

fn plain_arguments(step: &PathStep) -> Option<Value> {
    (!step.arguments.is_empty()).then(|| {
        Value::Object(
            step.arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    })
}

/// Follows the replayed path through a provider answer.
fn extract_node<'v>(response: &'v Value, path: &[PathStep], kinds: &[StepKind]) -> Option<&'v Value> {
    let mut current = response;
    for (step, kind) in path.iter().zip(kinds) {
        let value = current.get(&step.field)?;
        current = match kind {
            StepKind::Connection => value.get("items")?.as_array()?.first()?,
            StepKind::Array => {
                let id = step.id.as_ref()?;
                value
                    .as_array()?
                    .iter()
                    .find(|element| element.get(KEY_ALIAS) == Some(id))?
            }
            StepKind::Object => value,
        };
    }
    current.is_object().then_some(current)
}

fn plan_error_code(error: &PlanError) -> &'static str {
    match error {
        PlanError::UnknownField { .. } | PlanError::UnknownType(_) => codes::UNKNOWN_FIELD,
        PlanError::MaxDepthExceeded { .. } => codes::MAX_DEPTH_EXCEEDED,
    }
}

fn plan_failure(error: &PlanError) -> Response {
    tracing::debug!(%error, "query rejected");
    Response::error(FieldError::new(error.to_string()).with_code(plan_error_code(error)))
}

fn unavailable() -> Response {
    Response::error(FieldError::new("no merged schema is available").with_code(codes::SCHEMA_UNAVAILABLE))
}

fn cancelled() -> Response {
    tracing::debug!("request cancelled");
    Response::error(FieldError::new("request was cancelled").with_code(codes::CANCELLED))
}

fn not_found(path: Vec<PathSegment>) -> FieldError {
    FieldError::new("node not found")
        .with_path(path)
        .with_code(codes::NOT_FOUND)
}

fn provider_unavailable(path: Vec<PathSegment>, api: &str, error: &TransportError) -> FieldError {
    FieldError::new(format!("provider `{api}` is unavailable: {error}"))
        .with_path(path)
        .with_code(codes::PROVIDER_UNAVAILABLE)
        .with_provider(api)
}

fn resolution_failed(path: Vec<PathSegment>, api: &str, error: ResolutionError) -> FieldError {
    FieldError::new(error.message)
        .with_path(path)
        .with_code(codes::RESOLUTION_FAILED)
        .with_provider(api)
}
