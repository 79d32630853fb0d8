//! The published graph schema.
//!
//! A [`GraphSchema`] is the caller-facing rendering of one merged schema
//! generation: plain type definitions keyed by name, printable as SDL.

use crate::config::GatewayConfig;
use crate::merge::{
    FieldTarget, MergedArgument, MergedField, MergedInputField, MergedObjectType, MergedSchema,
    MergedType, API_TYPE, ERROR_TYPE,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Name of the interface every keyed object implements.
pub const NODE_INTERFACE: &str = "Node";

const CUSTOM_SCALARS: [&str; 3] = ["Decimal", "Guid", "DateTime"];

/// A published schema generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSchema {
    pub generation: u64,
    pub query_type: String,
    pub mutation_type: Option<String>,
    pub types: IndexMap<String, TypeDef>,
}

/// A type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            TypeDef::Scalar(s) => &s.name,
            TypeDef::Object(o) => &o.name,
            TypeDef::Interface(i) => &i.name,
            TypeDef::Enum(e) => &e.name,
            TypeDef::InputObject(i) => &i.name,
        }
    }
}

/// Scalar type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
}

/// Object type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

/// Interface type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
}

/// Enum type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: Vec<String>,
}

/// Input object type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputFieldDef>,
}

/// Field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputFieldDef>,
}

impl FieldDef {
    fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
        }
    }

    fn with_argument(mut self, argument: InputFieldDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }
}

/// Input field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
}

impl InputFieldDef {
    fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
        }
    }
}

/// Type reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn non_null(inner: TypeRef) -> Self {
        Self::NonNull(Box::new(inner))
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// The innermost named type.
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::NonNull(inner) | TypeRef::List(inner) => inner.base_name(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

impl GraphSchema {
    /// Renders a merged schema generation.
    pub fn from_merged(schema: &MergedSchema, config: &GatewayConfig) -> Self {
        let mut types: IndexMap<String, TypeDef> = IndexMap::new();
        let mut add = |def: TypeDef| {
            types.insert(def.name().to_string(), def);
        };

        for name in CUSTOM_SCALARS {
            add(TypeDef::Scalar(ScalarDef {
                name: name.to_string(),
                description: None,
            }));
        }
        add(TypeDef::Interface(InterfaceDef {
            name: NODE_INTERFACE.to_string(),
            description: None,
            fields: [(
                "id".to_string(),
                FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))),
            )]
            .into_iter()
            .collect(),
        }));

        let has_mutations = schema.mutations().next().is_some();
        if has_mutations {
            add(TypeDef::Object(ObjectDef {
                name: ERROR_TYPE.to_string(),
                description: None,
                fields: fields([
                    FieldDef::new("field", TypeRef::named("String")),
                    FieldDef::new("message", TypeRef::named("String")),
                ]),
                implements: Vec::new(),
            }));
        }

        add(TypeDef::Object(ObjectDef {
            name: "Query".to_string(),
            description: None,
            fields: fields([
                FieldDef::new("api", TypeRef::non_null(TypeRef::named(API_TYPE))),
                FieldDef::new(config.node_field.as_str(), TypeRef::named(NODE_INTERFACE))
                    .with_argument(InputFieldDef::new("id", TypeRef::non_null(TypeRef::named("ID")))),
            ]),
            implements: Vec::new(),
        }));

        if has_mutations {
            add(TypeDef::Object(ObjectDef {
                name: "Mutation".to_string(),
                description: None,
                fields: fields(schema.mutations().map(|mutation| {
                    FieldDef::new(mutation.name.as_str(), TypeRef::named(&mutation.payload_type))
                        .with_argument(InputFieldDef::new(
                            "input",
                            TypeRef::non_null(TypeRef::named(&mutation.input_type)),
                        ))
                })),
                implements: Vec::new(),
            }));
        }

        for merged in schema.types() {
            for def in render_type(merged) {
                add(def);
            }
        }

        Self {
            generation: schema.generation(),
            query_type: "Query".to_string(),
            mutation_type: has_mutations.then(|| "Mutation".to_string()),
            types,
        }
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    /// Prints the schema as SDL.
    pub fn to_sdl(&self) -> String {
        let mut blocks = Vec::with_capacity(self.types.len());
        for def in self.types.values() {
            let mut out = String::new();
            // Writing to a String cannot fail.
            let _ = print_type(&mut out, def);
            blocks.push(out);
        }
        let mut sdl = blocks.join("\n");
        if !sdl.is_empty() && !sdl.ends_with('\n') {
            sdl.push('\n');
        }
        sdl
    }
}

fn fields(defs: impl IntoIterator<Item = FieldDef>) -> IndexMap<String, FieldDef> {
    defs.into_iter().map(|d| (d.name.clone(), d)).collect()
}

fn render_type(merged: &MergedType) -> Vec<TypeDef> {
    match merged {
        MergedType::Object(object) => render_object(object),
        MergedType::Enum(enumeration) => vec![TypeDef::Enum(EnumDef {
            name: enumeration.complex_name.clone(),
            description: enumeration.description.clone(),
            values: enumeration.values.clone(),
        })],
        MergedType::Input(input) => vec![TypeDef::InputObject(InputObjectDef {
            name: input.complex_name.clone(),
            description: input.description.clone(),
            fields: input
                .fields
                .values()
                .map(|f| (f.name.clone(), input_field(f)))
                .collect(),
        })],
        MergedType::Connection(connection) => vec![TypeDef::Object(ObjectDef {
            name: connection.complex_name.clone(),
            description: None,
            fields: fields([
                FieldDef::new("count", TypeRef::named("Int")),
                FieldDef::new(
                    "edges",
                    TypeRef::list(TypeRef::named(format!("{}_Edge", connection.element))),
                ),
            ]),
            implements: Vec::new(),
        })],
        MergedType::Edge(edge) => vec![TypeDef::Object(ObjectDef {
            name: edge.complex_name.clone(),
            description: None,
            fields: fields([
                FieldDef::new("cursor", TypeRef::named("String")),
                FieldDef::new("node", TypeRef::named(&edge.element)),
            ]),
            implements: Vec::new(),
        })],
        MergedType::MutationResult(payload) => vec![TypeDef::Object(ObjectDef {
            name: payload.complex_name.clone(),
            description: None,
            fields: fields([
                FieldDef::new("node", TypeRef::named(&payload.element)),
                FieldDef::new("edge", TypeRef::named(format!("{}_Edge", payload.element))),
                FieldDef::new("errors", TypeRef::list(TypeRef::named(ERROR_TYPE))),
                FieldDef::new("deletedId", TypeRef::named("ID")),
                FieldDef::new("clientMutationId", TypeRef::named("String")),
                FieldDef::new("api", TypeRef::non_null(TypeRef::named(API_TYPE))),
            ]),
            implements: Vec::new(),
        })],
    }
}

fn render_object(object: &MergedObjectType) -> Vec<TypeDef> {
    let mut defs = Vec::new();
    let mut implements = Vec::new();
    let mut object_fields = IndexMap::new();

    if let Some(key) = object.key_source() {
        implements.push(NODE_INTERFACE.to_string());
        object_fields.insert(
            "id".to_string(),
            FieldDef::new("id", TypeRef::non_null(TypeRef::named("ID"))),
        );
        object_fields.insert(
            "__id".to_string(),
            FieldDef::new("__id", TypeRef::named(key.key_type.graph_name())),
        );
    }
    object_fields.extend(object.fields.values().map(|f| (f.name.clone(), field_def(f))));

    let shared = object.sources.len() > 1;
    for api in object.apis().filter(|_| shared) {
        if let Some((name, interface_fields)) = object.extract_interface(api) {
            implements.push(name.clone());
            defs.push(TypeDef::Interface(InterfaceDef {
                name,
                description: None,
                fields: fields(interface_fields.into_iter().map(field_def)),
            }));
        }
    }

    defs.insert(
        0,
        TypeDef::Object(ObjectDef {
            name: object.complex_name.clone(),
            description: object.description.clone(),
            fields: object_fields,
            implements,
        }),
    );
    defs
}

fn output_type(field: &MergedField) -> TypeRef {
    let named = TypeRef::named(field.target.graph_name());
    if field.is_connection() {
        TypeRef::named(format!("{}_Connection", field.target.graph_name()))
    } else if field.is_array() {
        TypeRef::list(named)
    } else {
        named
    }
}

fn field_def(field: &MergedField) -> FieldDef {
    FieldDef {
        name: field.name.clone(),
        description: field.description.clone(),
        ty: output_type(field),
        arguments: field
            .arguments
            .iter()
            .map(|a| (a.name.clone(), argument_def(a)))
            .collect(),
    }
}

fn input_type(target: &FieldTarget, is_array: bool) -> TypeRef {
    let named = TypeRef::named(target.graph_name());
    if is_array {
        TypeRef::list(named)
    } else {
        named
    }
}

fn argument_def(argument: &MergedArgument) -> InputFieldDef {
    InputFieldDef {
        name: argument.name.clone(),
        description: argument.description.clone(),
        ty: input_type(&argument.target, argument.is_array),
    }
}

fn input_field(field: &MergedInputField) -> InputFieldDef {
    InputFieldDef {
        name: field.name.clone(),
        description: field.description.clone(),
        ty: input_type(&field.target, field.is_array),
    }
}

fn print_description(out: &mut String, description: Option<&str>, indent: &str) -> fmt::Result {
    if let Some(text) = description {
        writeln!(out, "{indent}\"\"\"{}\"\"\"", text.replace("\"\"\"", "\\\"\"\""))?;
    }
    Ok(())
}

fn print_arguments(out: &mut String, arguments: &IndexMap<String, InputFieldDef>) -> fmt::Result {
    if arguments.is_empty() {
        return Ok(());
    }
    let rendered: Vec<String> = arguments
        .values()
        .map(|a| format!("{}: {}", a.name, a.ty))
        .collect();
    write!(out, "({})", rendered.join(", "))
}

fn print_fields(out: &mut String, fields: &IndexMap<String, FieldDef>) -> fmt::Result {
    for field in fields.values() {
        print_description(out, field.description.as_deref(), "  ")?;
        write!(out, "  {}", field.name)?;
        print_arguments(out, &field.arguments)?;
        writeln!(out, ": {}", field.ty)?;
    }
    Ok(())
}

fn print_type(out: &mut String, def: &TypeDef) -> fmt::Result {
    match def {
        TypeDef::Scalar(scalar) => {
            print_description(out, scalar.description.as_deref(), "")?;
            writeln!(out, "scalar {}", scalar.name)
        }
        TypeDef::Object(object) => {
            print_description(out, object.description.as_deref(), "")?;
            write!(out, "type {}", object.name)?;
            if !object.implements.is_empty() {
                write!(out, " implements {}", object.implements.join(" & "))?;
            }
            writeln!(out, " {{")?;
            print_fields(out, &object.fields)?;
            writeln!(out, "}}")
        }
        TypeDef::Interface(interface) => {
            print_description(out, interface.description.as_deref(), "")?;
            writeln!(out, "interface {} {{", interface.name)?;
            print_fields(out, &interface.fields)?;
            writeln!(out, "}}")
        }
        TypeDef::Enum(enumeration) => {
            print_description(out, enumeration.description.as_deref(), "")?;
            writeln!(out, "enum {} {{", enumeration.name)?;
            for value in &enumeration.values {
                writeln!(out, "  {value}")?;
            }
            writeln!(out, "}}")
        }
        TypeDef::InputObject(input) => {
            print_description(out, input.description.as_deref(), "")?;
            writeln!(out, "input {} {{", input.name)?;
            for field in input.fields.values() {
                writeln!(out, "  {}: {}", field.name, field.ty)?;
            }
            writeln!(out, "}}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use kite_schema::{ApiDescription, ApiField, ApiObjectType, ApiType, FieldFlags, ScalarType};

    fn shop() -> ApiDescription {
        let order = ApiObjectType::new("Order")
            .with_field(ApiField::scalar("id", ScalarType::Integer, FieldFlags::IS_KEY | FieldFlags::QUERYABLE).unwrap())
            .with_field(ApiField::scalar("status", ScalarType::String, FieldFlags::QUERYABLE).unwrap());
        let mut description = ApiDescription::new("shop", "Shop");
        description.fields =
            vec![ApiField::object("orders", "Order", FieldFlags::IS_CONNECTION | FieldFlags::QUERYABLE).unwrap()];
        description.types = vec![ApiType::Object(order)];
        description
    }

    #[test]
    fn test_type_ref_display() {
        let ty = TypeRef::non_null(TypeRef::list(TypeRef::named("shop_Order")));
        assert_eq!(ty.to_string(), "[shop_Order]!");
        assert_eq!(ty.base_name(), "shop_Order");
    }

    #[test]
    fn test_print_single_provider_schema() {
        let merged = MergedSchema::merge(&[shop()]).unwrap();
        let schema = GraphSchema::from_merged(&merged, &GatewayConfig::default());

        assert_eq!(schema.mutation_type, None);
        assert_snapshot!(schema.to_sdl(), @r"
        scalar Decimal

        scalar Guid

        scalar DateTime

        interface Node {
          id: ID!
        }

        type Query {
          api: Api!
          node(id: ID!): Node
        }

        type Api {
          orders: shop_Order_Connection
        }

        type shop_Order implements Node {
          id: ID!
          __id: Int
          status: String
        }

        type shop_Order_Connection {
          count: Int
          edges: [shop_Order_Edge]
        }

        type shop_Order_Edge {
          cursor: String
          node: shop_Order
        }
        ");
    }

    #[test]
    fn test_multi_provider_objects_get_interfaces() {
        let mut west = shop();
        west.api_name = "west".to_string();
        let merged = MergedSchema::merge(&[shop(), west]).unwrap();
        let schema = GraphSchema::from_merged(&merged, &GatewayConfig::new().with_node_field("lookup"));

        let Some(TypeDef::Object(order)) = schema.get_type("shop_Order_west_Order") else {
            panic!("merged order type missing");
        };
        assert_eq!(order.implements, vec!["Node", "Ishop_Order", "Iwest_Order"]);
        assert!(matches!(schema.get_type("Iwest_Order"), Some(TypeDef::Interface(_))));

        let Some(TypeDef::Object(query)) = schema.get_type("Query") else {
            panic!("query type missing");
        };
        assert!(query.fields.contains_key("lookup"));
    }
}
