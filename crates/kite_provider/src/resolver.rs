//! Resolver trait and the direct value resolvers.
//!
//! Every registered field is backed by a [`Resolver`]. The resolver receives
//! the value produced by the field's accessor as an erased [`Source`] and
//! turns it into the JSON fragment for one [`ApiRequest`]. Failures are
//! reported through the [`ResolveContext`] and the field resolves to null.

use crate::error::ResolverError;
use crate::object::TypeCollector;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use kite_schema::{
    ApiEnumType, ApiField, ApiRequest, ApiType, RequestContext, ScalarValue, SecurityLogger,
    SecurityRecord,
};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// A value handed to a resolver.
pub type Source = dyn Any + Send + Sync;

/// Future type for resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = Value> + Send + 'a>>;

/// Receives resolution errors with the response path of the failed field.
pub type ErrorSink<'a> = dyn Fn(ResolverError, &[String]) + Send + Sync + 'a;

/// Request-scoped state shared by all resolvers of one call.
pub struct ResolveContext<'a> {
    request: &'a RequestContext,
    security: &'a dyn SecurityLogger,
    on_error: &'a ErrorSink<'a>,
    path: Vec<String>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(request: &'a RequestContext, security: &'a dyn SecurityLogger, on_error: &'a ErrorSink<'a>) -> Self {
        Self {
            request,
            security,
            on_error,
            path: Vec::new(),
        }
    }

    /// The same context one response key further down.
    pub fn at(&self, key: &str) -> ResolveContext<'a> {
        let mut path = self.path.clone();
        path.push(key.to_string());
        Self {
            request: self.request,
            security: self.security,
            on_error: self.on_error,
            path,
        }
    }

    /// Response keys leading to the field being resolved.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The caller's request context.
    pub fn request(&self) -> &RequestContext {
        self.request
    }

    /// Reports a resolution error at the current path.
    pub fn report(&self, error: ResolverError) {
        (self.on_error)(error, &self.path);
    }

    /// Emits a security record.
    pub fn log(&self, record: SecurityRecord) {
        self.security.record(record);
    }
}

/// Trait for field resolvers.
pub trait Resolver: Send + Sync {
    /// Resolves one request against `source`.
    fn resolve<'a>(
        &'a self,
        source: &'a Source,
        request: &'a ApiRequest,
        field: &'a ApiField,
        context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a>;

    /// The type this resolver produces, if it is not a scalar.
    fn element_type(&self) -> Option<ApiType> {
        None
    }

    /// Arguments this resolver adds to its field.
    fn type_arguments(&self) -> Vec<ApiField> {
        Vec::new()
    }

    /// Registers the types reachable through this resolver.
    fn visit_types(&self, _collector: &mut TypeCollector) {}
}

/// Merges requests that share a response key.
///
/// The first occurrence keeps its position, arguments and field name; nested
/// fields of later occurrences are appended to it.
pub fn merge_requests(requests: &[ApiRequest]) -> Vec<ApiRequest> {
    let mut merged: IndexMap<&str, ApiRequest> = IndexMap::new();
    for request in requests {
        match merged.get_mut(request.response_key()) {
            Some(existing) => {
                let mut fields = existing.fields.take().unwrap_or_default();
                fields.extend(request.sub_fields().iter().cloned());
                existing.fields = if fields.is_empty() { None } else { Some(fields) };
            }
            None => {
                merged.insert(request.response_key(), request.clone());
            }
        }
    }
    merged.into_values().collect()
}

fn unexpected(field: &ApiField, expected: &str, context: &ResolveContext<'_>) -> Value {
    context.report(ResolverError::UnexpectedSource {
        field: field.name.clone(),
        expected: expected.to_string(),
    });
    Value::Null
}

/// Resolves a [`ScalarValue`] to its JSON form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarResolver;

impl Resolver for ScalarResolver {
    fn resolve<'a>(
        &'a self,
        source: &'a Source,
        _request: &'a ApiRequest,
        field: &'a ApiField,
        context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a> {
        let value = match source.downcast_ref::<ScalarValue>() {
            Some(value) => value.to_json(),
            None => unexpected(field, "a scalar value", context),
        };
        Box::pin(async move { value })
    }
}

/// Always resolves to null.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl Resolver for NullResolver {
    fn resolve<'a>(
        &'a self,
        _source: &'a Source,
        _request: &'a ApiRequest,
        _field: &'a ApiField,
        _context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a> {
        Box::pin(async { Value::Null })
    }
}

/// An enumeration exposed by a provider.
pub trait ApiEnum: Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    /// Every value name, in declaration order.
    fn values() -> Vec<&'static str>;

    /// The name of this value.
    fn as_str(&self) -> &'static str;
}

/// Resolves an enum value to its name.
pub struct EnumResolver<E>(PhantomData<fn() -> E>);

impl<E> EnumResolver<E> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<E> Default for EnumResolver<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ApiEnum> EnumResolver<E> {
    fn api_type() -> ApiType {
        ApiType::Enum(ApiEnumType::new(E::TYPE_NAME, E::values()))
    }
}

impl<E: ApiEnum> Resolver for EnumResolver<E> {
    fn resolve<'a>(
        &'a self,
        source: &'a Source,
        _request: &'a ApiRequest,
        field: &'a ApiField,
        context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a> {
        let value = match source.downcast_ref::<E>() {
            Some(value) => Value::String(value.as_str().to_string()),
            None => unexpected(field, E::TYPE_NAME, context),
        };
        Box::pin(async move { value })
    }

    fn element_type(&self) -> Option<ApiType> {
        Some(Self::api_type())
    }

    fn visit_types(&self, collector: &mut TypeCollector) {
        collector.add(Self::api_type());
    }
}

/// Resolves a `Vec<E>` element by element with a child resolver.
pub struct SimpleCollectionResolver<E> {
    element: Arc<dyn Resolver>,
    marker: PhantomData<fn() -> E>,
}

impl<E> SimpleCollectionResolver<E> {
    pub fn new(element: Arc<dyn Resolver>) -> Self {
        Self {
            element,
            marker: PhantomData,
        }
    }
}

impl<E: Send + Sync + 'static> Resolver for SimpleCollectionResolver<E> {
    fn resolve<'a>(
        &'a self,
        source: &'a Source,
        request: &'a ApiRequest,
        field: &'a ApiField,
        context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a> {
        Box::pin(async move {
            let Some(items) = source.downcast_ref::<Vec<E>>() else {
                context.report(ResolverError::NotACollection {
                    field: field.name.clone(),
                });
                return Value::Null;
            };

            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(self.element.resolve(item, request, field, context).await);
            }
            Value::Array(values)
        })
    }

    fn element_type(&self) -> Option<ApiType> {
        self.element.element_type()
    }

    fn visit_types(&self, collector: &mut TypeCollector) {
        self.element.visit_types(collector);
    }
}

/// Handler behind a forwarded field.
pub type ForwardHandler<T> = Arc<
    dyn Fn(&T, &ApiRequest, &RequestContext) -> BoxFuture<'static, Result<Value, ResolverError>>
        + Send
        + Sync,
>;

/// Hands the whole request to an async handler that produces JSON directly.
///
/// The source is the parent object itself.
pub struct ForwardingResolver<T> {
    handler: ForwardHandler<T>,
}

impl<T> ForwardingResolver<T> {
    pub fn new(handler: ForwardHandler<T>) -> Self {
        Self { handler }
    }
}

impl<T: Send + Sync + 'static> Resolver for ForwardingResolver<T> {
    fn resolve<'a>(
        &'a self,
        source: &'a Source,
        request: &'a ApiRequest,
        field: &'a ApiField,
        context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a> {
        let Some(parent) = source.downcast_ref::<T>() else {
            let value = unexpected(field, std::any::type_name::<T>(), context);
            return Box::pin(async move { value });
        };

        let pending = (self.handler)(parent, request, context.request());
        Box::pin(async move {
            match pending.await {
                Ok(value) => value,
                Err(error) => {
                    context.report(error);
                    Value::Null
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kite_schema::{FieldFlags, RecordingSecurityLogger, ScalarType};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Status {
        Open,
        Shipped,
    }

    impl ApiEnum for Status {
        const TYPE_NAME: &'static str = "Status";

        fn values() -> Vec<&'static str> {
            vec!["Open", "Shipped"]
        }

        fn as_str(&self) -> &'static str {
            match self {
                Status::Open => "Open",
                Status::Shipped => "Shipped",
            }
        }
    }

    fn field() -> ApiField {
        ApiField::scalar("value", ScalarType::String, FieldFlags::QUERYABLE).unwrap()
    }

    #[test]
    fn test_merge_requests_by_alias() {
        let requests = vec![
            ApiRequest::new("customer").with_fields(vec![ApiRequest::new("name")]),
            ApiRequest::new("total"),
            ApiRequest::new("customer").with_fields(vec![ApiRequest::new("email")]),
            ApiRequest::new("customer").with_alias("buyer"),
        ];

        let merged = merge_requests(&requests);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].response_key(), "customer");
        let names: Vec<_> = merged[0].sub_fields().iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(names, vec!["name", "email"]);
        assert_eq!(merged[2].response_key(), "buyer");
    }

    #[tokio::test]
    async fn test_scalar_and_enum_resolvers() {
        let request_context = RequestContext::anonymous();
        let logger = RecordingSecurityLogger::new();
        let on_error = |_: ResolverError, _: &[String]| {};
        let context = ResolveContext::new(&request_context, &logger, &on_error);
        let request = ApiRequest::new("value");
        let field = field();

        let value = ScalarValue::from(42);
        assert_eq!(ScalarResolver.resolve(&value, &request, &field, &context).await, json!(42));

        let status = Status::Shipped;
        let resolver = EnumResolver::<Status>::new();
        assert_eq!(resolver.resolve(&status, &request, &field, &context).await, json!("Shipped"));
        assert_eq!(resolver.element_type().unwrap().type_name(), "Status");
    }

    #[test]
    fn test_errors_carry_the_response_path() {
        let request_context = RequestContext::anonymous();
        let logger = RecordingSecurityLogger::new();
        let paths = Mutex::new(Vec::new());
        let on_error = |_: ResolverError, path: &[String]| paths.lock().unwrap().push(path.join("."));
        {
            let context = ResolveContext::new(&request_context, &logger, &on_error);
            let nested = context.at("orders").at("items");
            assert_eq!(nested.path(), ["orders", "items"]);
            assert!(context.path().is_empty());

            nested.report(ResolverError::Failed("down".to_string()));
            context.report(ResolverError::Failed("down".to_string()));
        }
        assert_eq!(paths.into_inner().unwrap(), vec!["orders.items", ""]);
    }

    #[tokio::test]
    async fn test_wrong_source_is_reported() {
        let request_context = RequestContext::anonymous();
        let logger = RecordingSecurityLogger::new();
        let errors = Mutex::new(Vec::new());
        let on_error = |e: ResolverError, _: &[String]| errors.lock().unwrap().push(e);
        let context = ResolveContext::new(&request_context, &logger, &on_error);
        let request = ApiRequest::new("value");
        let field = field();

        let resolver = SimpleCollectionResolver::<ScalarValue>::new(Arc::new(ScalarResolver));
        let not_a_list = ScalarValue::from("x");
        assert_eq!(resolver.resolve(&not_a_list, &request, &field, &context).await, Value::Null);

        let list = vec![ScalarValue::from("a"), ScalarValue::Null];
        assert_eq!(resolver.resolve(&list, &request, &field, &context).await, json!(["a", null]));

        let errors = errors.into_inner().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ResolverError::NotACollection { .. }));
    }
}
