//! The type merge model.
//!
//! Provider descriptions are merged into one immutable [`MergedSchema`].
//! Providers are visited in API-name order. Every type reachable from the
//! providers' roots becomes a [`MergedType`] keyed by its complex name; an
//! object reached through the same field of several providers becomes one
//! multi-provider object.

use crate::error::MergeError;
use indexmap::IndexMap;
use kite_core::diagnostics::codes;
use kite_core::{escape_name, qualified_name, DiagnosticBag};
use kite_schema::{
    ApiDescription, ApiEnumType, ApiField, ApiMutation, ApiObjectType, ApiType, FieldFlags,
    MutationKind, ScalarType,
};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;

/// Name of the merged type aggregating every provider's root fields.
pub const API_TYPE: &str = "Api";

/// Name of the gateway's error object in mutation payloads.
pub const ERROR_TYPE: &str = "ErrorDescription";

/// Flags that must agree between providers declaring the same field.
fn shape_flags() -> FieldFlags {
    FieldFlags::IS_KEY | FieldFlags::IS_CONNECTION | FieldFlags::IS_ARRAY
}

/// What a merged field or argument points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    Scalar(ScalarType),
    /// A merged enum, by complex name.
    Enum(String),
    /// A merged object (or, in argument position, input) type, by complex name.
    Object(String),
}

impl FieldTarget {
    /// The published name of the target type.
    pub fn graph_name(&self) -> &str {
        match self {
            FieldTarget::Scalar(scalar) => scalar.graph_name(),
            FieldTarget::Enum(name) | FieldTarget::Object(name) => name,
        }
    }
}

/// One provider's declaration of a merged field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSource {
    pub api: String,
    pub field: ApiField,
}

/// A published argument.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedArgument {
    pub name: String,
    pub target: FieldTarget,
    pub is_array: bool,
    /// Typed arguments (filter, sort, paging) are left out of global ids.
    pub is_type_argument: bool,
    pub description: Option<String>,
}

/// A field of a merged object.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedField {
    pub name: String,
    pub target: FieldTarget,
    /// Key, connection and array flags shared by every source.
    pub flags: FieldFlags,
    pub description: Option<String>,
    pub arguments: Vec<MergedArgument>,
    pub sources: Vec<FieldSource>,
}

impl MergedField {
    pub fn is_connection(&self) -> bool {
        self.flags.contains(FieldFlags::IS_CONNECTION)
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(FieldFlags::IS_ARRAY)
    }

    /// The merged object this field leads to, if any.
    pub fn object_type(&self) -> Option<&str> {
        match &self.target {
            FieldTarget::Object(name) => Some(name),
            _ => None,
        }
    }

    /// The declaration of `api`, if it contributes this field.
    pub fn source(&self, api: &str) -> Option<&ApiField> {
        self.sources.iter().find(|s| s.api == api).map(|s| &s.field)
    }

    /// Names of arguments that are not typed arguments.
    pub fn is_plain_argument(&self, name: &str) -> bool {
        self.arguments
            .iter()
            .any(|a| a.name == name && !a.is_type_argument)
    }
}

/// One provider's contribution to a merged object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSource {
    pub api: String,
    pub type_name: String,
    /// Name of the provider's key field.
    pub key: Option<String>,
    pub key_type: ScalarType,
}

/// An object type contributed by one or more providers.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedObjectType {
    pub original_type_name: String,
    pub complex_name: String,
    pub description: Option<String>,
    pub sources: Vec<ObjectSource>,
    pub fields: IndexMap<String, MergedField>,
}

impl MergedObjectType {
    /// The key of the first provider declaring one.
    pub fn key_source(&self) -> Option<&ObjectSource> {
        self.sources.iter().find(|s| s.key.is_some())
    }

    pub fn has_key(&self) -> bool {
        self.key_source().is_some()
    }

    /// The name of `api`'s key field.
    pub fn key_for(&self, api: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| s.api == api)
            .and_then(|s| s.key.as_deref())
    }

    /// Provider names, in merge order.
    pub fn apis(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.api.as_str())
    }

    /// Provider interface names; empty for single-provider objects.
    pub fn provider_interfaces(&self) -> Vec<String> {
        if self.sources.len() < 2 {
            return Vec::new();
        }
        self.sources
            .iter()
            .map(|s| interface_name(&s.api, &s.type_name))
            .collect()
    }

    /// Fields contributed by `api`, for its provider interface.
    pub fn extract_interface(&self, api: &str) -> Option<(String, Vec<&MergedField>)> {
        let source = self.sources.iter().find(|s| s.api == api)?;
        let fields = self
            .fields
            .values()
            .filter(|f| f.source(api).is_some())
            .collect();
        Some((interface_name(api, &source.type_name), fields))
    }

    /// Returns true if an inline fragment on `condition` applies.
    pub fn matches_condition(&self, condition: &str) -> bool {
        condition == self.complex_name
            || (condition == "Node" && self.has_key())
            || self.provider_interfaces().iter().any(|i| i == condition)
    }
}

/// Provider interface name for a type of a multi-provider object.
pub fn interface_name(api: &str, type_name: &str) -> String {
    format!("I{}", qualified_name(api, type_name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEnumType {
    pub original_type_name: String,
    pub complex_name: String,
    pub description: Option<String>,
    pub api: String,
    pub values: Vec<String>,
}

/// A field of an input type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedInputField {
    pub name: String,
    pub target: FieldTarget,
    pub is_array: bool,
    pub description: Option<String>,
}

/// An object type in argument position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedInputType {
    pub original_type_name: String,
    pub complex_name: String,
    pub description: Option<String>,
    pub api: String,
    pub fields: IndexMap<String, MergedInputField>,
}

/// A Relay-style page of `element` with `count` and `edges`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedConnectionType {
    pub complex_name: String,
    pub element: String,
}

/// One connection entry with `cursor` and `node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEdgeType {
    pub complex_name: String,
    pub element: String,
}

/// The payload of a connection mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedMutationResultType {
    pub complex_name: String,
    pub element: String,
}

/// A type of the merged graph.
#[derive(Debug, Clone, PartialEq)]
pub enum MergedType {
    Object(MergedObjectType),
    Enum(MergedEnumType),
    Input(MergedInputType),
    Connection(MergedConnectionType),
    Edge(MergedEdgeType),
    MutationResult(MergedMutationResultType),
}

impl MergedType {
    pub fn complex_name(&self) -> &str {
        match self {
            MergedType::Object(t) => &t.complex_name,
            MergedType::Enum(t) => &t.complex_name,
            MergedType::Input(t) => &t.complex_name,
            MergedType::Connection(t) => &t.complex_name,
            MergedType::Edge(t) => &t.complex_name,
            MergedType::MutationResult(t) => &t.complex_name,
        }
    }

    /// The provider type name, or the element's for synthesized types.
    pub fn original_type_name(&self) -> &str {
        match self {
            MergedType::Object(t) => &t.original_type_name,
            MergedType::Enum(t) => &t.original_type_name,
            MergedType::Input(t) => &t.original_type_name,
            MergedType::Connection(t) => &t.element,
            MergedType::Edge(t) => &t.element,
            MergedType::MutationResult(t) => &t.element,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            MergedType::Object(t) => t.description.as_deref(),
            MergedType::Enum(t) => t.description.as_deref(),
            MergedType::Input(t) => t.description.as_deref(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&MergedObjectType> {
        match self {
            MergedType::Object(t) => Some(t),
            _ => None,
        }
    }
}

/// A published connection mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedMutation {
    /// Published field name, `{api}_{mutation}` escaped.
    pub name: String,
    pub api: String,
    /// The provider's declaration; its name is the provider mutation name.
    pub field: ApiField,
    pub kind: MutationKind,
    /// Connection path below the provider root.
    pub container_path: Vec<String>,
    /// Complex name of the element object.
    pub element: String,
    pub input_type: String,
    pub payload_type: String,
}

/// A provider taking part in a merged schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub api_name: String,
    pub version: String,
}

/// One generation of the merged graph.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSchema {
    generation: u64,
    providers: Vec<ProviderInfo>,
    descriptions: Vec<ApiDescription>,
    types: IndexMap<String, MergedType>,
    mutations: IndexMap<String, MergedMutation>,
    diagnostics: DiagnosticBag,
}

impl MergedSchema {
    /// Merges provider descriptions.
    ///
    /// Every problem is collected; any error means no schema.
    pub fn merge(descriptions: &[ApiDescription]) -> Result<Self, MergeError> {
        let mut sorted: Vec<ApiDescription> = descriptions.to_vec();
        sorted.sort_by(|a, b| a.api_name.cmp(&b.api_name));

        let mut merger = Merger::default();
        let mut accepted: Vec<&ApiDescription> = Vec::with_capacity(sorted.len());
        for description in &sorted {
            if accepted.iter().any(|d| d.api_name == description.api_name) {
                merger.diagnostics.error(
                    codes::DUPLICATE_PROVIDER,
                    "Duplicate provider",
                    description.api_name.as_str(),
                    "provider name is published more than once",
                );
                continue;
            }
            accepted.push(description);
        }

        let providers: Vec<Provider<'_>> = accepted
            .iter()
            .map(|description| Provider::index(description, &mut merger.diagnostics))
            .collect();

        let roots: Vec<(usize, ApiObjectType)> = providers
            .iter()
            .enumerate()
            .map(|(index, provider)| (index, provider.description.root_type()))
            .collect();
        let root_sources: Vec<(usize, &ApiObjectType)> =
            roots.iter().map(|(index, root)| (*index, root)).collect();
        merger.merge_object(&providers, API_TYPE.to_string(), API_TYPE, &root_sources);

        for provider in &providers {
            for mutation in &provider.description.mutations {
                merger.merge_mutation(provider, mutation);
            }
        }

        let empty = merger
            .types
            .get(API_TYPE)
            .and_then(MergedType::as_object)
            .map_or(true, |api| api.fields.is_empty());
        if empty {
            merger.diagnostics.warning(
                codes::EMPTY_SCHEMA,
                "Empty schema",
                API_TYPE,
                "no provider publishes a queryable field",
            );
        }

        if merger.diagnostics.has_errors() {
            return Err(MergeError {
                diagnostics: merger.diagnostics,
            });
        }

        tracing::debug!(
            providers = providers.len(),
            types = merger.types.len(),
            mutations = merger.mutations.len(),
            "provider descriptions merged"
        );

        Ok(Self {
            generation: 0,
            providers: accepted
                .iter()
                .map(|d| ProviderInfo {
                    api_name: d.api_name.clone(),
                    version: d.version.clone(),
                })
                .collect(),
            descriptions: sorted,
            types: merger.types,
            mutations: merger.mutations,
            diagnostics: merger.diagnostics,
        })
    }

    #[must_use]
    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn providers(&self) -> &[ProviderInfo] {
        &self.providers
    }

    /// The merged descriptions, in API-name order.
    pub fn descriptions(&self) -> &[ApiDescription] {
        &self.descriptions
    }

    /// Warnings produced by the merge.
    pub fn diagnostics(&self) -> &DiagnosticBag {
        &self.diagnostics
    }

    pub fn types(&self) -> impl Iterator<Item = &MergedType> {
        self.types.values()
    }

    pub fn get_type(&self, complex_name: &str) -> Option<&MergedType> {
        self.types.get(complex_name)
    }

    pub fn object(&self, complex_name: &str) -> Option<&MergedObjectType> {
        self.get_type(complex_name).and_then(MergedType::as_object)
    }

    /// The merged root object.
    pub fn api(&self) -> Option<&MergedObjectType> {
        self.object(API_TYPE)
    }

    pub fn mutations(&self) -> impl Iterator<Item = &MergedMutation> {
        self.mutations.values()
    }

    pub fn mutation(&self, name: &str) -> Option<&MergedMutation> {
        self.mutations.get(name)
    }

    /// Returns true if the descriptions match the ones this schema was built from.
    pub fn is_built_from(&self, descriptions: &[ApiDescription]) -> bool {
        let mut sorted: Vec<&ApiDescription> = descriptions.iter().collect();
        sorted.sort_by(|a, b| a.api_name.cmp(&b.api_name));
        sorted.len() == self.descriptions.len()
            && sorted.iter().zip(&self.descriptions).all(|(a, b)| *a == b)
    }
}

/// One provider's declared types, indexed by name.
struct Provider<'a> {
    description: &'a ApiDescription,
    types: FxHashMap<&'a str, &'a ApiType>,
}

impl<'a> Provider<'a> {
    fn index(description: &'a ApiDescription, diagnostics: &mut DiagnosticBag) -> Self {
        let api = description.api_name.as_str();
        let mut types: FxHashMap<&str, &ApiType> = FxHashMap::default();
        for api_type in &description.types {
            match types.entry(api_type.type_name()) {
                Entry::Occupied(_) => diagnostics.error(
                    codes::DUPLICATE_TYPE,
                    "Duplicate type",
                    format!("{api}.{}", api_type.type_name()),
                    "type name is declared more than once",
                ),
                Entry::Vacant(slot) => {
                    slot.insert(api_type);
                }
            }
        }

        let provider = Self { description, types };
        let root = description.root_type();
        provider.check_references(&root, diagnostics);
        for api_type in &description.types {
            if let ApiType::Object(object) = api_type {
                provider.check_references(object, diagnostics);
            }
        }
        for mutation in &description.mutations {
            provider.check_field(&description.type_name, &mutation.field, diagnostics);
        }
        provider
    }

    fn check_references(&self, object: &ApiObjectType, diagnostics: &mut DiagnosticBag) {
        for field in &object.fields {
            self.check_field(&object.type_name, field, diagnostics);
        }
    }

    fn check_field(&self, owner: &str, field: &ApiField, diagnostics: &mut DiagnosticBag) {
        let api = &self.description.api_name;
        if let Err(error) = field.validate() {
            diagnostics.error(
                codes::INVALID_FIELD_FLAGS,
                "Invalid field",
                format!("{api}.{owner}.{}", field.name),
                error.to_string(),
            );
        }
        for declared in std::iter::once(field).chain(&field.arguments) {
            if let Some(type_name) = &declared.type_name {
                if !self.types.contains_key(type_name.as_str()) {
                    diagnostics.error(
                        codes::UNDEFINED_TYPE,
                        "Undefined type",
                        format!("{api}.{owner}.{}", field.name),
                        format!("type `{type_name}` is not declared"),
                    );
                }
            }
        }
    }

    fn object(&self, name: &str) -> Option<&'a ApiObjectType> {
        self.types.get(name).and_then(|t| t.as_object())
    }

    fn enumeration(&self, name: &str) -> Option<&'a ApiEnumType> {
        match self.types.get(name) {
            Some(ApiType::Enum(e)) => Some(e),
            _ => None,
        }
    }

    fn api(&self) -> &'a str {
        &self.description.api_name
    }
}

/// The kind a provider field resolves to, used to compare declarations.
enum Shape<'a> {
    Scalar(ScalarType),
    Enum(&'a ApiEnumType),
    Object,
}

struct PendingField<'a> {
    shape: Shape<'a>,
    sources: Vec<(usize, &'a ApiField)>,
    objects: Vec<(usize, &'a ApiObjectType)>,
}

#[derive(Default)]
struct Merger {
    diagnostics: DiagnosticBag,
    types: IndexMap<String, MergedType>,
    mutations: IndexMap<String, MergedMutation>,
}

impl Merger {
    fn shape<'a>(provider: &Provider<'a>, field: &ApiField) -> Option<Shape<'a>> {
        match &field.type_name {
            None => Some(Shape::Scalar(field.scalar_type)),
            Some(name) => match provider.enumeration(name) {
                Some(enumeration) => Some(Shape::Enum(enumeration)),
                None => provider.object(name).map(|_| Shape::Object),
            },
        }
    }

    fn same_shape(a: (&Shape<'_>, &ApiField), b: (&Shape<'_>, &ApiField)) -> bool {
        let kinds_agree = match (a.0, b.0) {
            (Shape::Scalar(x), Shape::Scalar(y)) => x == y,
            (Shape::Enum(x), Shape::Enum(y)) => x.values == y.values,
            (Shape::Object, Shape::Object) => true,
            _ => false,
        };
        let argument_names = |field: &ApiField| -> Vec<String> {
            let mut names: Vec<String> = field.arguments.iter().map(|a| a.name.clone()).collect();
            names.sort_unstable();
            names
        };
        kinds_agree
            && a.1.flags.masked(shape_flags()) == b.1.flags.masked(shape_flags())
            && argument_names(a.1) == argument_names(b.1)
    }

    /// Merges the objects in `sources` into `complex_name`.
    fn merge_object<'s>(
        &mut self,
        providers: &[Provider<'s>],
        complex_name: String,
        original: &str,
        sources: &[(usize, &'s ApiObjectType)],
    ) {
        if self.types.contains_key(&complex_name) {
            return;
        }

        let object_sources: Vec<ObjectSource> = sources
            .iter()
            .map(|(index, object)| {
                let key = object.key_field();
                ObjectSource {
                    api: providers[*index].api().to_string(),
                    type_name: object.type_name.clone(),
                    key: key.map(|k| k.name.clone()),
                    key_type: key.map_or(ScalarType::None, |k| k.scalar_type),
                }
            })
            .collect();
        self.check_key_types(&complex_name, &object_sources);
        let description = sources.iter().find_map(|(_, o)| o.description.clone());
        let mut merged = MergedObjectType {
            original_type_name: original.to_string(),
            complex_name: complex_name.clone(),
            description,
            sources: object_sources,
            fields: IndexMap::new(),
        };
        // Placeholder so recursive references terminate.
        self.types
            .insert(complex_name.clone(), MergedType::Object(merged.clone()));

        let mut pending: IndexMap<&'s str, PendingField<'s>> = IndexMap::new();
        for &(index, object) in sources {
            let provider = &providers[index];
            let keyed = object.key_field().is_some();
            for field in &object.fields {
                if !field.flags.contains(FieldFlags::QUERYABLE) {
                    continue;
                }
                if keyed && (field.name == "id" || field.name == "__id") {
                    continue;
                }
                let Some(shape) = Self::shape(provider, field) else {
                    continue;
                };

                match pending.get_mut(field.name.as_str()) {
                    None => {
                        let objects = field
                            .type_name
                            .as_deref()
                            .and_then(|name| provider.object(name))
                            .map(|o| vec![(index, o)])
                            .unwrap_or_default();
                        pending.insert(
                            &field.name,
                            PendingField {
                                shape,
                                sources: vec![(index, field)],
                                objects,
                            },
                        );
                    }
                    Some(existing) => {
                        let first = existing.sources[0].1;
                        if !Self::same_shape((&existing.shape, first), (&shape, field)) {
                            let first_api = providers[existing.sources[0].0].api();
                            self.diagnostics.error(
                                codes::INCOMPATIBLE_FIELD,
                                "Incompatible field",
                                format!("{complex_name}.{}", field.name),
                                format!(
                                    "declared differently by `{first_api}` and `{}`",
                                    provider.api()
                                ),
                            );
                            continue;
                        }
                        existing.sources.push((index, field));
                        if let Some(object) = field.type_name.as_deref().and_then(|n| provider.object(n)) {
                            existing.objects.push((index, object));
                        }
                    }
                }
            }
        }

        for (name, field) in pending {
            let (first_index, first) = field.sources[0];
            let target = match &field.shape {
                Shape::Scalar(scalar) => FieldTarget::Scalar(*scalar),
                Shape::Enum(enumeration) => {
                    FieldTarget::Enum(self.merge_enum(providers[first_index].api(), enumeration))
                }
                Shape::Object => {
                    let element = object_complex_name(providers, &field.objects);
                    let original = field.objects[0].1.type_name.as_str();
                    self.merge_object(providers, element.clone(), original, &field.objects);
                    if first.is_connection() {
                        self.ensure_connection(&element);
                    }
                    FieldTarget::Object(element)
                }
            };
            let arguments = self.merge_arguments(&providers[first_index], &first.arguments);
            merged.fields.insert(
                name.to_string(),
                MergedField {
                    name: name.to_string(),
                    target,
                    flags: first.flags.masked(shape_flags()),
                    description: first.description.clone(),
                    arguments,
                    sources: field
                        .sources
                        .iter()
                        .map(|(index, f)| FieldSource {
                            api: providers[*index].api().to_string(),
                            field: (*f).clone(),
                        })
                        .collect(),
                },
            );
        }

        self.types.insert(complex_name, MergedType::Object(merged));
    }

    fn merge_arguments(&mut self, provider: &Provider<'_>, arguments: &[ApiField]) -> Vec<MergedArgument> {
        arguments
            .iter()
            .filter_map(|argument| {
                let target = self.input_target(provider, argument)?;
                Some(MergedArgument {
                    name: argument.name.clone(),
                    target,
                    is_array: argument.flags.intersects(FieldFlags::IS_ARRAY | FieldFlags::IS_CONNECTION),
                    is_type_argument: argument.flags.contains(FieldFlags::IS_TYPE_ARGUMENT),
                    description: argument.description.clone(),
                })
            })
            .collect()
    }

    fn input_target(&mut self, provider: &Provider<'_>, field: &ApiField) -> Option<FieldTarget> {
        match &field.type_name {
            None => Some(FieldTarget::Scalar(field.scalar_type)),
            Some(name) => {
                if let Some(enumeration) = provider.enumeration(name) {
                    return Some(FieldTarget::Enum(self.merge_enum(provider.api(), enumeration)));
                }
                let object = provider.object(name)?;
                Some(FieldTarget::Object(self.merge_input(provider, object)))
            }
        }
    }

    fn merge_enum(&mut self, api: &str, enumeration: &ApiEnumType) -> String {
        let complex_name = qualified_name(api, &enumeration.type_name);
        self.types
            .entry(complex_name.clone())
            .or_insert_with(|| {
                MergedType::Enum(MergedEnumType {
                    original_type_name: enumeration.type_name.clone(),
                    complex_name: complex_name.clone(),
                    description: enumeration.description.clone(),
                    api: api.to_string(),
                    values: enumeration.values.clone(),
                })
            });
        complex_name
    }

    fn merge_input(&mut self, provider: &Provider<'_>, object: &ApiObjectType) -> String {
        let complex_name = format!("{}_Input", qualified_name(provider.api(), &object.type_name));
        if self.types.contains_key(&complex_name) {
            return complex_name;
        }

        let mut input = MergedInputType {
            original_type_name: object.type_name.clone(),
            complex_name: complex_name.clone(),
            description: object.description.clone(),
            api: provider.api().to_string(),
            fields: IndexMap::new(),
        };
        self.types
            .insert(complex_name.clone(), MergedType::Input(input.clone()));

        for field in &object.fields {
            let usable = field.flags.contains(FieldFlags::CAN_BE_USED_IN_INPUT)
                && field
                    .arguments
                    .iter()
                    .all(|a| a.flags.contains(FieldFlags::IS_TYPE_ARGUMENT));
            if !usable {
                continue;
            }
            let Some(target) = self.input_target(provider, field) else {
                continue;
            };
            input.fields.insert(
                field.name.clone(),
                MergedInputField {
                    name: field.name.clone(),
                    target,
                    is_array: field.flags.intersects(FieldFlags::IS_ARRAY | FieldFlags::IS_CONNECTION),
                    description: field.description.clone(),
                },
            );
        }

        self.types.insert(complex_name.clone(), MergedType::Input(input));
        complex_name
    }

    fn ensure_connection(&mut self, element: &str) {
        let connection = format!("{element}_Connection");
        let edge = format!("{element}_Edge");
        self.types.entry(connection.clone()).or_insert_with(|| {
            MergedType::Connection(MergedConnectionType {
                complex_name: connection,
                element: element.to_string(),
            })
        });
        self.types.entry(edge.clone()).or_insert_with(|| {
            MergedType::Edge(MergedEdgeType {
                complex_name: edge,
                element: element.to_string(),
            })
        });
    }

    fn merge_mutation(&mut self, provider: &Provider<'_>, mutation: &ApiMutation) {
        let api = provider.api();
        let location = format!("{api}.{}", mutation.field.name);
        let invalid = |merger: &mut Merger, message: &str| {
            merger.diagnostics.error(
                codes::INVALID_MUTATION,
                "Invalid mutation",
                location.clone(),
                message.to_string(),
            );
        };

        let path = mutation.container_path();
        let Some(element) = self.connection_element(api, &path) else {
            invalid(self, "mutation container is not a connection");
            return;
        };
        let Some(element_type) = mutation
            .field
            .type_name
            .as_deref()
            .and_then(|name| provider.object(name))
        else {
            invalid(self, "mutation does not return an object type");
            return;
        };

        let name = format!("{}_{}", escape_name(api), escape_name(&mutation.field.name));
        let input_type = format!("{name}_Input");
        let mut input = MergedInputType {
            original_type_name: mutation.field.name.clone(),
            complex_name: input_type.clone(),
            description: None,
            api: api.to_string(),
            fields: IndexMap::new(),
        };
        for argument in &mutation.field.arguments {
            let Some(target) = self.input_target(provider, argument) else {
                continue;
            };
            input.fields.insert(
                argument.name.clone(),
                MergedInputField {
                    name: argument.name.clone(),
                    target,
                    is_array: argument.flags.intersects(FieldFlags::IS_ARRAY | FieldFlags::IS_CONNECTION),
                    description: argument.description.clone(),
                },
            );
        }
        input.fields.insert(
            "clientMutationId".to_string(),
            MergedInputField {
                name: "clientMutationId".to_string(),
                target: FieldTarget::Scalar(ScalarType::String),
                is_array: false,
                description: None,
            },
        );
        // The element's own input type must exist even if no argument named it.
        self.merge_input(provider, element_type);
        self.types.insert(input_type.clone(), MergedType::Input(input));

        let payload_type = format!("{element}_NodeMutationPayload");
        self.types.entry(payload_type.clone()).or_insert_with(|| {
            MergedType::MutationResult(MergedMutationResultType {
                complex_name: payload_type.clone(),
                element: element.clone(),
            })
        });

        // Authorization rules on a mutation are scoped by connection action.
        let mut field = mutation.field.clone();
        field.flags.insert(FieldFlags::IS_CONNECTION);
        self.mutations.insert(
            name.clone(),
            MergedMutation {
                name,
                api: api.to_string(),
                field,
                kind: mutation.kind,
                container_path: path.iter().map(|s| (*s).to_string()).collect(),
                element,
                input_type,
                payload_type,
            },
        );
    }

    /// Warns when providers key one merged type with different scalar types.
    fn check_key_types(&mut self, complex_name: &str, sources: &[ObjectSource]) {
        let mut keyed = sources.iter().filter(|source| source.key.is_some());
        let Some(first) = keyed.next() else {
            return;
        };
        for other in keyed.filter(|source| source.key_type != first.key_type) {
            self.diagnostics.warning(
                codes::KEY_TYPE_MISMATCH,
                "Key type mismatch",
                complex_name.to_string(),
                format!(
                    "`{}` keys with {} but `{}` keys with {}",
                    first.api,
                    first.key_type.graph_name(),
                    other.api,
                    other.key_type.graph_name()
                ),
            );
        }
    }

    /// Follows `path` through the merged graph for `api`, returning the
    /// element type of the connection it ends in.
    fn connection_element(&self, api: &str, path: &[&str]) -> Option<String> {
        let (last, init) = path.split_last()?;
        let mut current = API_TYPE.to_string();
        for segment in init {
            let object = self.types.get(&current)?.as_object()?;
            let field = object.fields.get(*segment)?;
            if field.is_connection() || field.is_array() || field.source(api).is_none() {
                return None;
            }
            current = field.object_type()?.to_string();
        }
        let object = self.types.get(&current)?.as_object()?;
        let field = object.fields.get(*last)?;
        if !field.is_connection() || field.source(api).is_none() {
            return None;
        }
        field.object_type().map(str::to_string)
    }
}

/// Complex name of the object merged from `objects`.
fn object_complex_name(providers: &[Provider<'_>], objects: &[(usize, &ApiObjectType)]) -> String {
    let mut names: Vec<String> = objects
        .iter()
        .map(|(index, object)| qualified_name(providers[*index].api(), &object.type_name))
        .collect();
    names.sort_unstable();
    names.dedup();
    names.join("_")
}
