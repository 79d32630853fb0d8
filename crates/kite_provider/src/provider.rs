//! The provider endpoint.

use crate::connection::MutationCollector;
use crate::error::ResolverError;
use crate::object::{metadata, resolve_object, ApiObject, TypeCollector};
use crate::resolver::{ErrorSink, ResolveContext};
use async_trait::async_trait;
use kite_schema::{
    ApiDescription, ApiEndpoint, ApiRequest, EndpointError, MutationKind, RequestContext,
    ResolutionError, SecurityLogger, TracingSecurityLogger,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};

/// Serves a root object `R` as a provider API.
///
/// The published [`ApiDescription`] is assembled once, from the fields of
/// `R` and everything reachable from them.
pub struct ApiProvider<R> {
    root: Arc<R>,
    description: ApiDescription,
    generation_errors: Vec<String>,
    security: Arc<dyn SecurityLogger>,
}

impl<R: ApiObject> ApiProvider<R> {
    /// Creates a provider named `api_name`.
    ///
    /// Declaration errors do not prevent the provider from starting; they are
    /// logged and available from [`ApiProvider::generation_errors`].
    pub fn new(api_name: impl Into<String>, root: R) -> Self {
        let api_name = api_name.into();
        let metadata = metadata::<R>();

        let mut types = TypeCollector::new();
        types.visit_fields(&metadata);
        let (types, generation_errors) = types.into_parts();

        let mut mutations = MutationCollector::default();
        mutations.enter(R::TYPE_NAME);
        metadata.collect_mutations(None, &mut mutations);

        for error in &generation_errors {
            tracing::error!(api = %api_name, %error, "provider declaration rejected");
        }
        tracing::debug!(
            api = %api_name,
            types = types.len(),
            mutations = mutations.mutations.len(),
            "provider description assembled"
        );

        let description = ApiDescription {
            description: R::DESCRIPTION.map(str::to_string),
            fields: metadata.api_type().fields,
            types,
            mutations: mutations.mutations,
            ..ApiDescription::new(api_name, R::TYPE_NAME)
        };

        Self {
            root: Arc::new(root),
            description,
            generation_errors,
            security: Arc::new(TracingSecurityLogger),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.description.version = version.into();
        self
    }

    /// Replaces the security log sink.
    #[must_use]
    pub fn with_security_logger(mut self, logger: Arc<dyn SecurityLogger>) -> Self {
        self.security = logger;
        self
    }

    pub fn api_name(&self) -> &str {
        &self.description.api_name
    }

    pub fn root(&self) -> &R {
        &self.root
    }

    /// Declaration errors found while assembling the description.
    pub fn generation_errors(&self) -> &[String] {
        &self.generation_errors
    }

    /// Resolves root field requests into one JSON object.
    pub async fn resolve_query(
        &self,
        requests: &[ApiRequest],
        context: &RequestContext,
        on_error: &ErrorSink<'_>,
    ) -> Value {
        let context = ResolveContext::new(context, self.security.as_ref(), on_error);
        resolve_object(self.root.as_ref(), requests, &context).await
    }

    /// Executes the mutation named by `request.field_name`.
    pub async fn resolve_mutation(
        &self,
        request: &ApiRequest,
        context: &RequestContext,
        on_error: &ErrorSink<'_>,
    ) -> Result<Value, ResolverError> {
        let segments: Vec<&str> = request.field_name.split('.').collect();
        let (kind, path) = match segments.split_last() {
            Some((method, path)) if !path.is_empty() => {
                let kind = MutationKind::from_method_name(method)
                    .ok_or_else(|| ResolverError::UnknownMutation(request.field_name.clone()))?;
                (kind, path)
            }
            _ => return Err(ResolverError::UnknownMutation(request.field_name.clone())),
        };

        let context = ResolveContext::new(context, self.security.as_ref(), on_error);
        metadata::<R>()
            .mutate(self.root.as_ref(), path, kind, request, &context)
            .await
    }
}

#[async_trait]
impl<R: ApiObject> ApiEndpoint for ApiProvider<R> {
    fn description(&self) -> &ApiDescription {
        &self.description
    }

    async fn query(&self, requests: &[ApiRequest], context: &RequestContext) -> Result<Value, EndpointError> {
        let api = self.api_name();
        let errors = Mutex::new(Vec::new());
        let on_error = |error: ResolverError, path: &[String]| {
            tracing::warn!(api, %error, path = %path.join("."), "field resolution failed");
            record(&errors, &error, path);
        };
        let mut answer = self.resolve_query(requests, context, &on_error).await;
        ResolutionError::attach(&mut answer, errors.into_inner().unwrap_or_else(PoisonError::into_inner));
        Ok(answer)
    }

    async fn mutate(&self, request: &ApiRequest, context: &RequestContext) -> Result<Value, EndpointError> {
        let api = self.api_name();
        let errors = Mutex::new(Vec::new());
        let on_error = |error: ResolverError, path: &[String]| {
            tracing::warn!(api, %error, path = %path.join("."), "mutation payload resolution failed");
            record(&errors, &error, path);
        };
        let mut payload = self
            .resolve_mutation(request, context, &on_error)
            .await
            .map_err(|error| {
                tracing::warn!(api, mutation = %request.field_name, %error, "mutation failed");
                EndpointError::from(error)
            })?;
        ResolutionError::attach(&mut payload, errors.into_inner().unwrap_or_else(PoisonError::into_inner));
        Ok(payload)
    }
}

fn record(errors: &Mutex<Vec<ResolutionError>>, error: &ResolverError, path: &[String]) {
    errors
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(ResolutionError::new(error.to_string(), path.to_vec()));
}
