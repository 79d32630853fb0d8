//! Object registration and resolution.
//!
//! A provider type implements [`ApiObject`] and lists its fields once in
//! [`ApiObject::describe`]. The registrations are compiled into a
//! [`TypeMetadata`] table on first use and cached for the process lifetime;
//! the table drives declaration publishing, field resolution, filtering,
//! sorting and partial updates.
//!
//! # Example
//!
//! ```ignore
//! impl ApiObject for Order {
//!     const TYPE_NAME: &'static str = "Order";
//!
//!     fn describe(builder: &mut ObjectBuilder<Self>) {
//!         builder.key("id", ScalarType::Integer, |o: &Order| o.id);
//!         builder
//!             .scalar("status", ScalarType::String, |o: &Order| o.status.clone())
//!             .filterable()
//!             .sortable()
//!             .settable(|o, v| o.status = v.as_str().unwrap_or_default().to_string());
//!     }
//! }
//! ```

use crate::collection::CollectionResolver;
use crate::connection::{ConnectionMutations, MutationCollector, MutationTarget, NestedMutations, NodeConnection};
use crate::error::ResolverError;
use crate::registry;
use crate::resolver::{
    ApiEnum, EnumResolver, ForwardingResolver, NullResolver, ResolveContext, Resolver,
    ResolverFuture, ScalarResolver, SimpleCollectionResolver, Source,
};
use crate::updater::Copier;
use futures::future::{self, BoxFuture};
use indexmap::IndexMap;
use kite_schema::{
    ApiField, ApiObjectType, ApiRequest, ApiType, AuthorizationRule, ConnectionAction,
    DeclarationError, FieldFlags, LogAccessRule, MutationKind, RequestContext, ScalarType,
    ScalarValue, SecurityLogType, SecurityRecord, Severity,
};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// A Rust type exposed through the provider.
pub trait ApiObject: Send + Sync + 'static {
    /// The declared type name.
    const TYPE_NAME: &'static str;

    const DESCRIPTION: Option<&'static str> = None;

    /// Registers the type's fields.
    fn describe(builder: &mut ObjectBuilder<Self>)
    where
        Self: Sized;
}

pub(crate) type ScalarGetter<T> = Arc<dyn Fn(&T) -> ScalarValue + Send + Sync>;
pub(crate) type ValueGetter<T> = Arc<dyn Fn(&T) -> Option<Box<Source>> + Send + Sync>;

/// How a field reads its value from the parent object.
pub(crate) enum Accessor<T> {
    /// A typed scalar; also used by filters, sorting and updates.
    Scalar(ScalarGetter<T>),
    /// An owned child value handed to the field's resolver.
    Value(ValueGetter<T>),
    /// The resolver receives the parent object itself.
    Parent,
}

/// One registered field.
pub(crate) struct FieldBinding<T> {
    pub(crate) field: ApiField,
    pub(crate) accessor: Accessor<T>,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) copier: Option<Copier<T>>,
    pub(crate) mutations: Option<Arc<dyn MutationTarget>>,
    pub(crate) mutation_kinds: Vec<MutationKind>,
}

impl<T: ApiObject> FieldBinding<T> {
    pub(crate) fn scalar_getter(&self) -> Option<&ScalarGetter<T>> {
        match &self.accessor {
            Accessor::Scalar(getter) => Some(getter),
            _ => None,
        }
    }

    async fn resolve(&self, object: &T, request: &ApiRequest, context: &ResolveContext<'_>) -> Value {
        match &self.accessor {
            Accessor::Scalar(getter) => {
                let value = getter(object);
                self.resolver.resolve(&value, request, &self.field, context).await
            }
            Accessor::Value(getter) => match getter(object) {
                Some(value) => {
                    self.resolver
                        .resolve(value.as_ref(), request, &self.field, context)
                        .await
                }
                None => NullResolver.resolve(&(), request, &self.field, context).await,
            },
            Accessor::Parent => self.resolver.resolve(object, request, &self.field, context).await,
        }
    }
}

/// Collects field registrations for one type.
pub struct ObjectBuilder<T> {
    bindings: Vec<FieldBinding<T>>,
    errors: Vec<DeclarationError>,
}

impl<T: ApiObject> ObjectBuilder<T> {
    fn new() -> Self {
        Self {
            bindings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn push(
        &mut self,
        field: Result<ApiField, DeclarationError>,
        accessor: Accessor<T>,
        resolver: Arc<dyn Resolver>,
    ) -> FieldDecl<'_, T> {
        match field {
            Ok(field) => {
                self.bindings.push(FieldBinding {
                    field,
                    accessor,
                    resolver,
                    copier: None,
                    mutations: None,
                    mutation_kinds: Vec::new(),
                });
                FieldDecl {
                    binding: self.bindings.last_mut(),
                }
            }
            Err(error) => {
                self.errors.push(error);
                FieldDecl { binding: None }
            }
        }
    }

    fn scalar_accessor<V, G>(getter: G) -> Accessor<T>
    where
        G: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        Accessor::Scalar(Arc::new(move |object: &T| -> ScalarValue { getter(object).into() }))
    }

    /// Registers the type's key.
    pub fn key<V, G>(&mut self, name: &str, scalar_type: ScalarType, getter: G) -> FieldDecl<'_, T>
    where
        G: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        self.push(
            ApiField::scalar(name, scalar_type, FieldFlags::IS_KEY | FieldFlags::QUERYABLE),
            Self::scalar_accessor(getter),
            Arc::new(ScalarResolver),
        )
    }

    /// Registers a scalar field.
    pub fn scalar<V, G>(&mut self, name: &str, scalar_type: ScalarType, getter: G) -> FieldDecl<'_, T>
    where
        G: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        self.push(
            ApiField::scalar(name, scalar_type, FieldFlags::QUERYABLE),
            Self::scalar_accessor(getter),
            Arc::new(ScalarResolver),
        )
    }

    /// Registers a list of scalars.
    pub fn scalar_array<V, G>(&mut self, name: &str, scalar_type: ScalarType, getter: G) -> FieldDecl<'_, T>
    where
        G: Fn(&T) -> Vec<V> + Send + Sync + 'static,
        V: Into<ScalarValue>,
    {
        let accessor = Accessor::Value(Arc::new(move |object: &T| {
            let values: Vec<ScalarValue> = getter(object).into_iter().map(Into::into).collect();
            Some(Box::new(values) as Box<Source>)
        }));
        self.push(
            ApiField::scalar(name, scalar_type, FieldFlags::QUERYABLE | FieldFlags::IS_ARRAY),
            accessor,
            Arc::new(SimpleCollectionResolver::<ScalarValue>::new(Arc::new(ScalarResolver))),
        )
    }

    /// Registers an enum field.
    pub fn enumeration<E, G>(&mut self, name: &str, getter: G) -> FieldDecl<'_, T>
    where
        E: ApiEnum,
        G: Fn(&T) -> E + Send + Sync + 'static,
    {
        let accessor = Accessor::Value(Arc::new(move |object: &T| {
            Some(Box::new(getter(object)) as Box<Source>)
        }));
        self.push(
            ApiField::object(name, E::TYPE_NAME, FieldFlags::QUERYABLE),
            accessor,
            Arc::new(EnumResolver::<E>::new()),
        )
    }

    /// Registers an optional nested object.
    pub fn object<U, G>(&mut self, name: &str, getter: G) -> FieldDecl<'_, T>
    where
        U: ApiObject,
        G: Fn(&T) -> Option<U> + Send + Sync + 'static,
    {
        let getter = Arc::new(getter);
        let read = Arc::clone(&getter);
        let accessor = Accessor::Value(Arc::new(move |object: &T| {
            read(object).map(|child| Box::new(child) as Box<Source>)
        }));

        let mut decl = self.push(
            ApiField::object(name, U::TYPE_NAME, FieldFlags::QUERYABLE),
            accessor,
            Arc::new(ObjectResolver::<U>::new()),
        );
        decl.set_mutations(Arc::new(NestedMutations::<T, U>::new(move |object: &T| getter(object))));
        decl
    }

    /// Registers a nested object stored inline in the parent.
    ///
    /// Embedded objects are part of the parent's input shape and can be
    /// partially updated.
    pub fn embedded<U, G, M>(&mut self, name: &str, get: G, get_mut: M) -> FieldDecl<'_, T>
    where
        U: ApiObject + Clone + Default,
        G: Fn(&T) -> &U + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut U + Send + Sync + 'static,
    {
        let get = Arc::new(get);
        let read = Arc::clone(&get);
        let accessor = Accessor::Value(Arc::new(move |object: &T| {
            Some(Box::new(read(object).clone()) as Box<Source>)
        }));

        let copier = Copier::nested(Arc::clone(&get), Arc::new(get_mut));
        let mut decl = self.push(
            ApiField::object(name, U::TYPE_NAME, FieldFlags::QUERYABLE | FieldFlags::CAN_BE_USED_IN_INPUT),
            accessor,
            Arc::new(ObjectResolver::<U>::new()),
        );
        decl.set_mutations(Arc::new(NestedMutations::<T, U>::new(move |object: &T| {
            Some(get(object).clone())
        })));
        if let Some(binding) = decl.binding.as_deref_mut() {
            binding.copier = Some(copier);
        }
        decl
    }

    /// Registers a plain list of objects.
    pub fn array<U, G>(&mut self, name: &str, getter: G) -> FieldDecl<'_, T>
    where
        U: ApiObject,
        G: Fn(&T) -> Vec<U> + Send + Sync + 'static,
    {
        let accessor = Accessor::Value(Arc::new(move |object: &T| {
            Some(Box::new(getter(object)) as Box<Source>)
        }));
        self.push(
            ApiField::object(name, U::TYPE_NAME, FieldFlags::QUERYABLE | FieldFlags::IS_ARRAY),
            accessor,
            Arc::new(SimpleCollectionResolver::<U>::new(Arc::new(ObjectResolver::<U>::new()))),
        )
    }

    /// Registers an in-memory connection.
    pub fn connection<U, G>(&mut self, name: &str, getter: G) -> FieldDecl<'_, T>
    where
        U: ApiObject,
        G: Fn(&T) -> Vec<U> + Send + Sync + 'static,
    {
        let accessor = Accessor::Value(Arc::new(move |object: &T| {
            Some(Box::new(getter(object)) as Box<Source>)
        }));
        self.push(
            ApiField::object(name, U::TYPE_NAME, FieldFlags::QUERYABLE | FieldFlags::IS_CONNECTION),
            accessor,
            Arc::new(CollectionResolver::<U>::new()),
        )
    }

    /// Registers a connection backed by a [`NodeConnection`].
    ///
    /// Node connections publish create, update and delete mutations unless
    /// restricted with [`FieldDecl::with_mutations`].
    pub fn node_connection<U, G>(&mut self, name: &str, getter: G) -> FieldDecl<'_, T>
    where
        U: ApiObject + Default,
        G: Fn(&T) -> Arc<dyn NodeConnection<U>> + Send + Sync + 'static,
    {
        let getter = Arc::new(getter);
        let read = Arc::clone(&getter);
        let accessor = Accessor::Value(Arc::new(move |object: &T| {
            Some(Box::new(read(object)) as Box<Source>)
        }));

        let mut decl = self.push(
            ApiField::object(name, U::TYPE_NAME, FieldFlags::QUERYABLE | FieldFlags::IS_CONNECTION),
            accessor,
            Arc::new(CollectionResolver::<U>::new()),
        );
        decl.set_mutations(Arc::new(ConnectionMutations::<T, U>::new(move |object: &T| {
            getter(object)
        })));
        decl.with_mutations(&[MutationKind::Create, MutationKind::Update, MutationKind::Delete])
    }

    /// Registers a field answered by an async handler returning JSON.
    pub fn forward<F>(&mut self, name: &str, scalar_type: ScalarType, handler: F) -> FieldDecl<'_, T>
    where
        F: Fn(&T, &ApiRequest, &RequestContext) -> BoxFuture<'static, Result<Value, ResolverError>>
            + Send
            + Sync
            + 'static,
    {
        self.push(
            ApiField::scalar(name, scalar_type, FieldFlags::QUERYABLE),
            Accessor::Parent,
            Arc::new(ForwardingResolver::<T>::new(Arc::new(handler))),
        )
    }

    fn finish(self) -> TypeMetadata<T> {
        let mut errors = self.errors;
        let mut bindings = Vec::with_capacity(self.bindings.len());
        let mut index = FxHashMap::default();

        for binding in self.bindings {
            if let Err(error) = binding.field.validate() {
                errors.push(error);
                continue;
            }
            if index.contains_key(&binding.field.name) {
                errors.push(DeclarationError::DuplicateField(binding.field.name.clone()));
                continue;
            }
            index.insert(binding.field.name.clone(), bindings.len());
            bindings.push(binding);
        }

        let key = bindings
            .iter()
            .position(|b| b.field.is_key() && b.scalar_getter().is_some());

        TypeMetadata {
            bindings,
            index,
            key,
            errors,
        }
    }
}

/// Modifiers for the field just registered.
///
/// A declaration that was rejected yields a detached `FieldDecl` whose
/// modifiers do nothing.
pub struct FieldDecl<'b, T> {
    binding: Option<&'b mut FieldBinding<T>>,
}

impl<T: ApiObject> FieldDecl<'_, T> {
    fn update(mut self, apply: impl FnOnce(&mut FieldBinding<T>)) -> Self {
        if let Some(binding) = self.binding.as_deref_mut() {
            apply(binding);
        }
        self
    }

    fn set_mutations(&mut self, target: Arc<dyn MutationTarget>) {
        if let Some(binding) = self.binding.as_deref_mut() {
            binding.mutations = Some(target);
        }
    }

    /// Allows filtering on this field.
    pub fn filterable(self) -> Self {
        self.update(|b| b.field.flags.insert(FieldFlags::IS_FILTERABLE))
    }

    /// Allows sorting on this field.
    pub fn sortable(self) -> Self {
        self.update(|b| b.field.flags.insert(FieldFlags::IS_SORTABLE))
    }

    pub fn description(self, description: &str) -> Self {
        self.update(|b| b.field.description = Some(description.to_string()))
    }

    /// Adds a declared argument.
    pub fn argument(self, argument: ApiField) -> Self {
        self.update(|b| b.field.arguments.push(argument))
    }

    /// Makes the field part of the input shape.
    ///
    /// Only scalar fields take a setter; nested input uses
    /// [`ObjectBuilder::embedded`].
    pub fn settable<S>(self, setter: S) -> Self
    where
        S: Fn(&mut T, ScalarValue) + Send + Sync + 'static,
    {
        self.update(|b| {
            if let Some(read) = b.scalar_getter().cloned() {
                b.copier = Some(Copier::Scalar {
                    scalar_type: b.field.scalar_type,
                    read,
                    write: Arc::new(setter),
                });
                b.field.flags.insert(FieldFlags::CAN_BE_USED_IN_INPUT);
            }
        })
    }

    /// Hides the field from queries while keeping it in the input shape.
    pub fn input_only(self) -> Self {
        self.update(|b| b.field.flags.remove(FieldFlags::QUERYABLE))
    }

    pub fn authorize(self, rule: AuthorizationRule) -> Self {
        self.update(|b| b.field.authorization_rules.push(rule))
    }

    pub fn log_access(self, rule: LogAccessRule) -> Self {
        self.update(|b| b.field.log_access_rules.push(rule))
    }

    pub fn require_session(self) -> Self {
        self.update(|b| b.field.require_authenticated_session = true)
    }

    pub fn require_user(self) -> Self {
        self.update(|b| b.field.require_authenticated_user_session = true)
    }

    /// Restricts the mutations a node connection publishes.
    pub fn with_mutations(self, kinds: &[MutationKind]) -> Self {
        self.update(|b| {
            if b.field.is_connection() && b.mutations.is_some() {
                b.mutation_kinds = kinds.to_vec();
            }
        })
    }
}

/// The compiled registration table of one type.
pub struct TypeMetadata<T> {
    bindings: Vec<FieldBinding<T>>,
    index: FxHashMap<String, usize>,
    key: Option<usize>,
    errors: Vec<DeclarationError>,
}

/// Returns the shared registration table of `T`.
pub fn metadata<T: ApiObject>() -> Arc<TypeMetadata<T>> {
    registry::cached::<T, TypeMetadata<T>>(TypeMetadata::<T>::build)
}

impl<T: ApiObject> TypeMetadata<T> {
    fn build() -> Self {
        let mut builder = ObjectBuilder::new();
        T::describe(&mut builder);
        builder.finish()
    }

    pub fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    /// Declarations rejected during registration.
    pub fn errors(&self) -> &[DeclarationError] {
        &self.errors
    }

    /// The registered field declarations.
    pub fn fields(&self) -> impl Iterator<Item = &ApiField> {
        self.bindings.iter().map(|b| &b.field)
    }

    pub(crate) fn bindings(&self) -> &[FieldBinding<T>] {
        &self.bindings
    }

    pub(crate) fn binding(&self, name: &str) -> Option<&FieldBinding<T>> {
        self.index.get(name).map(|&i| &self.bindings[i])
    }

    pub(crate) fn key_binding(&self) -> Option<&FieldBinding<T>> {
        self.key.map(|i| &self.bindings[i])
    }

    /// Reads the key of `object`.
    pub fn key_value(&self, object: &T) -> Option<ScalarValue> {
        self.key_binding()
            .and_then(FieldBinding::scalar_getter)
            .map(|getter| getter(object))
    }

    /// The published declaration, including collection arguments.
    pub fn api_type(&self) -> ApiObjectType {
        let fields = self
            .bindings
            .iter()
            .map(|binding| {
                let mut field = binding.field.clone();
                field.arguments.extend(binding.resolver.type_arguments());
                field
            })
            .collect();

        ApiObjectType {
            type_name: T::TYPE_NAME.to_string(),
            description: T::DESCRIPTION.map(str::to_string),
            fields,
        }
    }

    /// Runs the mutation found at `path` below `object`.
    pub(crate) fn mutate<'a>(
        &'a self,
        object: &'a T,
        path: &'a [&'a str],
        kind: MutationKind,
        request: &'a ApiRequest,
        context: &'a ResolveContext<'a>,
    ) -> BoxFuture<'a, Result<Value, ResolverError>> {
        let target = path.split_first().and_then(|(head, rest)| {
            let binding = self.binding(head)?;
            let target = binding.mutations.as_ref()?;
            Some((binding, target, rest))
        });

        match target {
            Some((binding, target, rest)) => target.mutate(
                object,
                rest,
                kind,
                &binding.field,
                &binding.mutation_kinds,
                request,
                context,
            ),
            None => Box::pin(future::ready(Err(ResolverError::UnknownMutation(
                request.field_name.clone(),
            )))),
        }
    }

    /// Publishes the mutations reachable below this type.
    pub(crate) fn collect_mutations(&self, prefix: Option<&str>, collector: &mut MutationCollector) {
        for binding in &self.bindings {
            let Some(target) = &binding.mutations else {
                continue;
            };
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{}", binding.field.name),
                None => binding.field.name.clone(),
            };
            target.collect(&path, &binding.field, &binding.mutation_kinds, collector);
        }
    }
}

/// Resolves the requested fields of one object.
///
/// Requests sharing a response key are merged first. Fields the caller may
/// not query are omitted and an `OperationDenied` record is emitted for each.
pub(crate) async fn resolve_object<T: ApiObject>(
    object: &T,
    requests: &[ApiRequest],
    context: &ResolveContext<'_>,
) -> Value {
    let metadata = metadata::<T>();
    let mut result = Map::new();

    for request in crate::resolver::merge_requests(requests) {
        let Some(binding) = metadata.binding(&request.field_name) else {
            continue;
        };
        if !binding.field.flags.contains(FieldFlags::QUERYABLE) {
            continue;
        }
        if !binding
            .field
            .check_authorization(context.request(), ConnectionAction::Query)
        {
            context.log(SecurityRecord::new(
                SecurityLogType::OperationDenied,
                binding
                    .field
                    .max_log_severity(ConnectionAction::Query)
                    .unwrap_or(Severity::Trivial),
                context.request(),
                "Unauthorized call to {ApiPath}",
                vec![format!("{}.{}", T::TYPE_NAME, binding.field.name)],
            ));
            continue;
        }

        let key = request.response_key();
        let value = binding.resolve(object, &request, &context.at(key)).await;
        result.insert(key.to_string(), value);
    }

    Value::Object(result)
}

/// Resolves a `T` value against the requested sub-fields.
pub struct ObjectResolver<T>(PhantomData<fn() -> T>);

impl<T> ObjectResolver<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ObjectResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ApiObject> Resolver for ObjectResolver<T> {
    fn resolve<'a>(
        &'a self,
        source: &'a Source,
        request: &'a ApiRequest,
        field: &'a ApiField,
        context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a> {
        Box::pin(async move {
            match source.downcast_ref::<T>() {
                Some(object) => resolve_object(object, request.sub_fields(), context).await,
                None => {
                    context.report(ResolverError::UnexpectedSource {
                        field: field.name.clone(),
                        expected: T::TYPE_NAME.to_string(),
                    });
                    Value::Null
                }
            }
        })
    }

    fn element_type(&self) -> Option<ApiType> {
        Some(ApiType::Object(metadata::<T>().api_type()))
    }

    fn visit_types(&self, collector: &mut TypeCollector) {
        collector.visit::<T>();
    }
}

/// Walks registrations and gathers every reachable declared type.
#[derive(Debug, Default)]
pub struct TypeCollector {
    types: IndexMap<String, ApiType>,
    errors: Vec<String>,
}

impl TypeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `T` and everything reachable from its fields.
    pub fn visit<T: ApiObject>(&mut self) {
        if self.types.contains_key(T::TYPE_NAME) {
            return;
        }
        let metadata = metadata::<T>();
        self.add(ApiType::Object(metadata.api_type()));
        self.visit_fields(&metadata);
    }

    /// Adds everything reachable from the fields of `T`, but not `T` itself.
    pub fn visit_fields<T: ApiObject>(&mut self, metadata: &TypeMetadata<T>) {
        self.errors.extend(
            metadata
                .errors()
                .iter()
                .map(|error| format!("{}: {error}", T::TYPE_NAME)),
        );
        for binding in metadata.bindings() {
            binding.resolver.visit_types(self);
        }
    }

    /// Adds a single declaration.
    ///
    /// A second, different declaration under the same name is recorded as
    /// an error and dropped.
    pub fn add(&mut self, api_type: ApiType) {
        match self.types.get(api_type.type_name()) {
            Some(existing) if *existing != api_type => self.errors.push(format!(
                "conflicting declarations for type `{}`",
                api_type.type_name()
            )),
            Some(_) => {}
            None => {
                self.types.insert(api_type.type_name().to_string(), api_type);
            }
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// The collected declarations and errors.
    pub fn into_parts(self) -> (Vec<ApiType>, Vec<String>) {
        (self.types.into_values().collect(), self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kite_schema::{RecordingSecurityLogger, AccessTicket, UserDescription};
    use serde_json::json;

    #[derive(Debug, Clone, Default)]
    struct Address {
        city: String,
    }

    impl ApiObject for Address {
        const TYPE_NAME: &'static str = "Address";

        fn describe(builder: &mut ObjectBuilder<Self>) {
            builder
                .scalar("city", ScalarType::String, |a: &Address| a.city.clone())
                .settable(|a, v| a.city = v.as_str().unwrap_or_default().to_string());
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Customer {
        id: i64,
        name: String,
        tags: Vec<String>,
        address: Address,
        secret: String,
    }

    impl ApiObject for Customer {
        const TYPE_NAME: &'static str = "Customer";
        const DESCRIPTION: Option<&'static str> = Some("A buyer");

        fn describe(builder: &mut ObjectBuilder<Self>) {
            builder.key("id", ScalarType::Integer, |c: &Customer| c.id);
            builder
                .scalar("name", ScalarType::String, |c: &Customer| c.name.clone())
                .filterable()
                .sortable();
            builder.scalar_array("tags", ScalarType::String, |c: &Customer| c.tags.clone());
            builder.embedded("address", |c: &Customer| &c.address, |c: &mut Customer| &mut c.address);
            builder
                .scalar("secret", ScalarType::String, |c: &Customer| c.secret.clone())
                .require_user()
                .log_access(LogAccessRule::new(Severity::Major, "secret read"));
            builder.scalar("broken", ScalarType::None, |_: &Customer| ScalarValue::Null);
            builder.scalar("name", ScalarType::String, |_: &Customer| "again");
        }
    }

    fn customer() -> Customer {
        Customer {
            id: 7,
            name: "Ada".to_string(),
            tags: vec!["vip".to_string()],
            address: Address {
                city: "Oslo".to_string(),
            },
            secret: "s3cret".to_string(),
        }
    }

    #[test]
    fn test_metadata_declarations() {
        let metadata = metadata::<Customer>();
        let names: Vec<_> = metadata.fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "tags", "address", "secret"]);
        assert_eq!(metadata.errors().len(), 2);
        assert!(metadata
            .errors()
            .contains(&DeclarationError::DuplicateField("name".to_string())));

        let api_type = metadata.api_type();
        assert_eq!(api_type.description.as_deref(), Some("A buyer"));
        assert!(api_type.field("name").unwrap().flags.contains(FieldFlags::IS_FILTERABLE));
        assert!(api_type
            .field("address")
            .unwrap()
            .flags
            .contains(FieldFlags::CAN_BE_USED_IN_INPUT));
        assert_eq!(metadata.key_value(&customer()), Some(ScalarValue::Integer(7)));
        assert!(Arc::ptr_eq(&metadata, &super::metadata::<Customer>()));
    }

    #[test]
    fn test_type_collector_reaches_nested_types() {
        let mut collector = TypeCollector::new();
        collector.visit::<Customer>();
        let (types, errors) = collector.into_parts();
        let names: Vec<_> = types.iter().map(|t| t.type_name()).collect();
        assert_eq!(names, vec!["Customer", "Address"]);
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_object_respects_authorization() {
        let logger = RecordingSecurityLogger::new();
        let on_error = |_: ResolverError, _: &[String]| {};
        let requests = vec![
            ApiRequest::new("name"),
            ApiRequest::new("tags"),
            ApiRequest::new("address").with_fields(vec![ApiRequest::new("city")]),
            ApiRequest::new("secret"),
            ApiRequest::new("id").with_alias("__id"),
            ApiRequest::new("missing"),
        ];

        let anonymous = RequestContext::anonymous();
        let context = ResolveContext::new(&anonymous, &logger, &on_error);
        let value = resolve_object(&customer(), &requests, &context).await;
        assert_eq!(
            value,
            json!({
                "name": "Ada",
                "tags": ["vip"],
                "address": { "city": "Oslo" },
                "__id": 7
            })
        );

        let records = logger.take();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].log_type, SecurityLogType::OperationDenied);
        assert_eq!(records[0].severity, Severity::Major);
        assert_eq!(records[0].message(), "Unauthorized call to Customer.secret");

        let signed_in = RequestContext::with_ticket(
            AccessTicket::for_client("web").with_user(UserDescription::new("ada", "1")),
        );
        let context = ResolveContext::new(&signed_in, &logger, &on_error);
        let value = resolve_object(&customer(), &requests[3..4], &context).await;
        assert_eq!(value, json!({ "secret": "s3cret" }));
        assert!(logger.is_empty());
    }
}
