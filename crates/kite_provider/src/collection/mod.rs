//! Filtering, sorting and paging collections.
//!
//! For every element type `T` the first use builds a capability table: the
//! `<T>_Filter` input type, the `<T>_Sort` enum and the collection
//! arguments. The table is cached like the registration metadata.

pub mod filter;
pub mod sort;

pub use filter::{CompareOp, Filter};
pub use sort::{sort_items, SortCondition};

use crate::connection::NodeConnection;
use crate::error::ResolverError;
use crate::object::{metadata, resolve_object, ApiObject, ScalarGetter, TypeCollector};
use crate::registry;
use crate::resolver::{merge_requests, ResolveContext, Resolver, ResolverFuture, Source};
use filter::{checks_for, FilterCheck};
use indexmap::IndexMap;
use kite_schema::{
    ApiEnumType, ApiField, ApiObjectType, ApiRequest, ApiType, ConnectionAction, FieldFlags,
    ScalarType, ScalarValue, SecurityRecord,
};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// A parsed collection request.
pub struct CollectionQuery<T> {
    pub filter: Filter<T>,
    pub sort: Vec<SortCondition<T>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl<T> CollectionQuery<T> {
    /// A query selecting every item in source order.
    pub fn all() -> Self {
        Self {
            filter: Filter::Always(true),
            sort: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Filters, counts, sorts and pages `items`.
    ///
    /// Returns the number of matching items before paging and the page.
    pub fn apply<'i>(&self, items: &'i [T]) -> (usize, Vec<&'i T>) {
        let mut matching: Vec<&T> = items.iter().filter(|item| self.filter.matches(item)).collect();
        let count = matching.len();
        sort_items(&mut matching, &self.sort);

        let page = matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        (count, page)
    }
}

impl<T> std::fmt::Debug for CollectionQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionQuery")
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

/// The per-type filter, sort and argument tables.
pub(crate) struct Capability<T> {
    checks: IndexMap<String, FilterCheck<T>>,
    sorts: IndexMap<String, SortCondition<T>>,
    key: Option<(ScalarType, ScalarGetter<T>)>,
    filter_type: ApiObjectType,
    sort_type: ApiEnumType,
    arguments: Vec<ApiField>,
}

pub(crate) fn capability<T: ApiObject>() -> Arc<Capability<T>> {
    registry::cached::<T, Capability<T>>(Capability::<T>::build)
}

fn type_argument(field: Result<ApiField, kite_schema::DeclarationError>, description: &str) -> Option<ApiField> {
    field
        .ok()
        .map(|f| f.with_flags(FieldFlags::IS_TYPE_ARGUMENT).with_description(description))
}

impl<T: ApiObject> Capability<T> {
    fn build() -> Self {
        let metadata = metadata::<T>();
        let filter_name = format!("{}_Filter", T::TYPE_NAME);
        let sort_name = format!("{}_Sort", T::TYPE_NAME);

        let mut checks = IndexMap::new();
        let mut sorts = IndexMap::new();
        for binding in metadata.bindings() {
            let Some(accessor) = binding.scalar_getter() else {
                continue;
            };
            let field = &binding.field;
            if field.flags.contains(FieldFlags::IS_FILTERABLE) {
                checks.extend(checks_for(&field.name, field.scalar_type, accessor));
            }
            if field.flags.contains(FieldFlags::IS_SORTABLE) {
                for descending in [false, true] {
                    let condition = SortCondition::new(field.name.clone(), accessor.clone(), descending);
                    sorts.insert(format!("{condition:?}"), condition);
                }
            }
        }

        let key = metadata.key_binding().and_then(|binding| {
            binding
                .scalar_getter()
                .map(|getter| (binding.field.scalar_type, getter.clone()))
        });

        let mut filter_type = ApiObjectType::new(&filter_name);
        for (name, check) in &checks {
            if let Ok(field) = ApiField::scalar(name, check.literal_type(), FieldFlags::CAN_BE_USED_IN_INPUT) {
                filter_type.fields.push(field);
            }
        }
        for combinator in ["AND", "OR"] {
            if let Ok(field) = ApiField::object(
                combinator,
                &filter_name,
                FieldFlags::CAN_BE_USED_IN_INPUT | FieldFlags::IS_ARRAY,
            ) {
                filter_type.fields.push(field);
            }
        }

        let sort_type = ApiEnumType::new(&sort_name, sorts.keys().cloned());

        let mut arguments = Vec::new();
        if !checks.is_empty() {
            arguments.extend(type_argument(
                ApiField::object("filter", &filter_name, FieldFlags::NONE),
                "Filter condition",
            ));
        }
        if !sorts.is_empty() {
            arguments.extend(type_argument(
                ApiField::object("sort", &sort_name, FieldFlags::IS_ARRAY),
                "Sort keys, applied in order",
            ));
        }
        if let Some((scalar_type, _)) = &key {
            arguments.extend(type_argument(
                ApiField::scalar("id", *scalar_type, FieldFlags::NONE),
                "Select the element with this key",
            ));
        }
        arguments.extend(type_argument(
            ApiField::scalar("limit", ScalarType::Integer, FieldFlags::NONE),
            "Maximum number of items",
        ));
        arguments.extend(type_argument(
            ApiField::scalar("offset", ScalarType::Integer, FieldFlags::NONE),
            "Number of items to skip",
        ));

        Self {
            checks,
            sorts,
            key,
            filter_type,
            sort_type,
            arguments,
        }
    }

    /// Compiles a filter input value.
    ///
    /// Unknown keys are ignored. `AND`/`OR` values that are not lists are
    /// true.
    pub(crate) fn compile_filter(&self, value: &Value) -> Filter<T> {
        let Some(map) = value.as_object() else {
            return Filter::Always(true);
        };

        let mut conditions = Vec::with_capacity(map.len());
        for (key, value) in map {
            let condition = match (key.as_str(), value.as_array()) {
                ("AND", Some(items)) => Filter::And(items.iter().map(|v| self.compile_filter(v)).collect()),
                ("OR", Some(items)) => Filter::Or(items.iter().map(|v| self.compile_filter(v)).collect()),
                ("AND" | "OR", None) => Filter::Always(true),
                _ => match self.checks.get(key) {
                    Some(check) => check.compile(value),
                    None => continue,
                },
            };
            conditions.push(condition);
        }
        Filter::And(conditions)
    }

    /// Parses `filter`, `sort`, `id`, `limit` and `offset`.
    pub(crate) fn parse(&self, request: &ApiRequest) -> CollectionQuery<T> {
        let mut query = CollectionQuery::all();

        if let Some(id) = request.argument("id") {
            query.filter = match (&self.key, id) {
                (Some((scalar_type, accessor)), id) => match ScalarValue::from_json(*scalar_type, id) {
                    Some(literal) => Filter::Compare {
                        field: "id".to_string(),
                        accessor: accessor.clone(),
                        op: CompareOp::Eq,
                        literal,
                        lowercase: false,
                    },
                    None => Filter::Always(false),
                },
                (None, _) => Filter::Always(false),
            };
        }

        if let Some(filter) = request.argument("filter") {
            let filter = self.compile_filter(filter);
            query.filter = std::mem::replace(&mut query.filter, Filter::Always(true)).and(filter);
        }

        let sort_keys: Vec<&str> = match request.argument("sort") {
            Some(Value::Array(keys)) => keys.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(key)) => vec![key.as_str()],
            _ => Vec::new(),
        };
        query.sort = sort_keys
            .into_iter()
            .filter_map(|key| self.sorts.get(key).cloned())
            .collect();

        let count = |name| {
            request
                .argument(name)
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
        };
        query.limit = count("limit");
        query.offset = count("offset").unwrap_or(0);

        query
    }

    pub(crate) fn types(&self) -> [ApiType; 2] {
        [
            ApiType::Object(self.filter_type.clone()),
            ApiType::Enum(self.sort_type.clone()),
        ]
    }
}

/// Resolves a filtered, sorted and paged collection of `T`.
///
/// The source is either a `Vec<T>` or an `Arc<dyn NodeConnection<T>>`. The
/// response holds `count` (matches before paging) and `items`.
pub struct CollectionResolver<T>(PhantomData<fn() -> T>);

impl<T> CollectionResolver<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for CollectionResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ApiObject> CollectionResolver<T> {
    fn log_access(request: &ApiRequest, field: &ApiField, context: &ResolveContext<'_>) {
        let Some(rule) = field.matching_log_rule(ConnectionAction::Query) else {
            return;
        };
        let arguments = request
            .arguments
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string());

        context.log(SecurityRecord::new(
            rule.log_type,
            rule.severity,
            context.request(),
            rule.message.clone(),
            vec![field.name.clone(), arguments],
        ));
    }
}

impl<T: ApiObject> Resolver for CollectionResolver<T> {
    fn resolve<'a>(
        &'a self,
        source: &'a Source,
        request: &'a ApiRequest,
        field: &'a ApiField,
        context: &'a ResolveContext<'a>,
    ) -> ResolverFuture<'a> {
        Box::pin(async move {
            let query = capability::<T>().parse(request);

            let fetched;
            let (count, items): (usize, Vec<&T>) = if let Some(items) = source.downcast_ref::<Vec<T>>() {
                query.apply(items)
            } else if let Some(connection) = source.downcast_ref::<Arc<dyn NodeConnection<T>>>() {
                match connection.query(&query, context.request()).await {
                    Ok(result) => {
                        fetched = result;
                        (fetched.count, fetched.items.iter().collect())
                    }
                    Err(error) => {
                        context.report(error);
                        return Value::Null;
                    }
                }
            } else {
                context.report(ResolverError::NotACollection {
                    field: field.name.clone(),
                });
                return Value::Null;
            };

            Self::log_access(request, field, context);

            let mut response = Map::new();
            for sub in merge_requests(request.sub_fields()) {
                let value = match sub.field_name.as_str() {
                    "count" => Value::from(count),
                    "items" => {
                        let item_context = context.at(sub.response_key());
                        let mut values = Vec::with_capacity(items.len());
                        for item in &items {
                            values.push(resolve_object(*item, sub.sub_fields(), &item_context).await);
                        }
                        Value::Array(values)
                    }
                    _ => continue,
                };
                response.insert(sub.response_key().to_string(), value);
            }
            Value::Object(response)
        })
    }

    fn element_type(&self) -> Option<ApiType> {
        Some(ApiType::Object(metadata::<T>().api_type()))
    }

    fn type_arguments(&self) -> Vec<ApiField> {
        capability::<T>().arguments.clone()
    }

    fn visit_types(&self, collector: &mut TypeCollector) {
        collector.visit::<T>();
        let capability = capability::<T>();
        if !capability.checks.is_empty() {
            let [filter_type, _] = capability.types();
            collector.add(filter_type);
        }
        if !capability.sorts.is_empty() {
            let [_, sort_type] = capability.types();
            collector.add(sort_type);
        }
    }
}
