//! Response stitching.
//!
//! Stitching walks a plan a second time and assembles the caller's response
//! from provider answers. Each provider answer is carried as a [`Fragment`]
//! together with its provenance: the path of fields, arguments and keys that
//! led to it. Global ids are minted from that path.

use crate::global_id::{GlobalId, PathStep};
use crate::merge::ERROR_TYPE;
use crate::plan::{
    ConnectionItem, ConnectionPlan, EdgeItem, EdgePlan, FieldPlan, FieldShape, MutationFieldPlan, ObjectPlan,
    node_alias, PayloadItem, Planned, ID_REQUEST_ALIAS, KEY_ALIAS,
};
use serde_json::{Map, Value};

/// One provider's answer for an object, with the path that led to it.
#[derive(Debug, Clone)]
pub struct Fragment<'v> {
    pub api: &'v str,
    pub value: &'v Value,
    pub path: Vec<PathStep>,
}

impl<'v> Fragment<'v> {
    /// A provider's root answer.
    pub fn root(api: &'v str, value: &'v Value) -> Self {
        Self {
            api,
            value,
            path: Vec::new(),
        }
    }

    fn child(&self, value: &'v Value, step: PathStep) -> Self {
        let mut path = self.path.clone();
        path.push(step);
        Self {
            api: self.api,
            value,
            path,
        }
    }

    fn key(&self) -> Option<&'v Value> {
        self.value.get(KEY_ALIAS).filter(|v| !v.is_null())
    }
}

/// Assembles an object from the fragments of every provider contributing it.
///
/// Always yields an object; callers decide when a missing object is null.
pub fn stitch_object(plan: &ObjectPlan<'_>, fragments: &[Fragment<'_>]) -> Value {
    let mut out = Map::new();
    for planned in &plan.selections {
        let (key, value) = match planned {
            Planned::Typename { key } => (key, Value::String(plan.object.complex_name.clone())),
            Planned::GlobalId { key } => (key, global_id(fragments)),
            Planned::RawKey { key } => (
                key,
                fragments.iter().find_map(Fragment::key).cloned().unwrap_or(Value::Null),
            ),
            Planned::Pruned { key } => (key, Value::Null),
            Planned::Field(field) => (&field.key, stitch_field(field, fragments)),
        };
        out.insert(key.clone(), value);
    }
    Value::Object(out)
}

/// The global id of the first fragment carrying a key.
fn global_id(fragments: &[Fragment<'_>]) -> Value {
    fragments
        .iter()
        .find(|fragment| fragment.key().is_some())
        .map_or(Value::Null, |fragment| {
            GlobalId::new(fragment.api, fragment.path.clone()).to_value()
        })
}

fn stitch_field(field: &FieldPlan<'_>, fragments: &[Fragment<'_>]) -> Value {
    let sources: Vec<&Fragment<'_>> = fragments
        .iter()
        .filter(|fragment| field.apis.iter().any(|api| *api == fragment.api))
        .collect();
    let key = field.key.as_str();

    match &field.shape {
        FieldShape::Leaf => sources
            .iter()
            .filter_map(|fragment| fragment.value.get(key))
            .find(|value| !value.is_null())
            .cloned()
            .unwrap_or(Value::Null),
        FieldShape::Object(plan) if field.field.is_array() => {
            let mut answered = false;
            let mut list = Vec::new();
            for fragment in sources {
                let Some(Value::Array(items)) = fragment.value.get(key) else {
                    continue;
                };
                answered = true;
                for item in items {
                    if item.is_object() {
                        let step = field
                            .step()
                            .with_id(item.get(KEY_ALIAS).cloned().unwrap_or(Value::Null));
                        list.push(stitch_object(plan, &[fragment.child(item, step)]));
                    } else {
                        list.push(Value::Null);
                    }
                }
            }
            if answered {
                Value::Array(list)
            } else {
                Value::Null
            }
        }
        FieldShape::Object(plan) => {
            let children: Vec<Fragment<'_>> = sources
                .iter()
                .filter_map(|fragment| {
                    let value = fragment.value.get(key).filter(|v| v.is_object())?;
                    Some(fragment.child(value, field.step()))
                })
                .collect();
            if children.is_empty() {
                Value::Null
            } else {
                stitch_object(plan, &children)
            }
        }
        FieldShape::Connection(plan) => stitch_connection(field, plan, &sources),
    }
}

/// Sums counts and concatenates items in provider order.
fn stitch_connection(field: &FieldPlan<'_>, plan: &ConnectionPlan<'_>, sources: &[&Fragment<'_>]) -> Value {
    let answered: Vec<(&Fragment<'_>, &Map<String, Value>)> = sources
        .iter()
        .filter_map(|fragment| {
            let connection = fragment.value.get(&field.key)?.as_object()?;
            Some((*fragment, connection))
        })
        .collect();
    if answered.is_empty() {
        return Value::Null;
    }

    let step = field.step();
    let mut out = Map::new();
    for item in &plan.items {
        match item {
            ConnectionItem::Count { key } => {
                let count: u64 = answered
                    .iter()
                    .filter_map(|(_, connection)| connection.get("count").and_then(Value::as_u64))
                    .sum();
                out.insert(key.clone(), Value::from(count));
            }
            ConnectionItem::Typename { key, name } => {
                out.insert(key.clone(), Value::String(name.clone()));
            }
            ConnectionItem::Edges { key, edge } => {
                let mut edges = Vec::new();
                for (fragment, connection) in &answered {
                    let Some(Value::Array(items)) = connection.get(key) else {
                        continue;
                    };
                    for entry in items {
                        edges.push(stitch_edge(edge, fragment.api, &fragment.path, &step, entry));
                    }
                }
                out.insert(key.clone(), Value::Array(edges));
            }
        }
    }
    Value::Object(out)
}

/// Builds one edge from a provider item carrying `__id` and prefixed node fields.
pub(crate) fn stitch_edge(
    edge: &EdgePlan<'_>,
    api: &str,
    base_path: &[PathStep],
    step: &PathStep,
    item: &Value,
) -> Value {
    let id = item.get(KEY_ALIAS).cloned().unwrap_or(Value::Null);
    let mut out = Map::new();
    for entry in &edge.items {
        match entry {
            EdgeItem::Cursor { key } => {
                out.insert(key.clone(), cursor(&id));
            }
            EdgeItem::Typename { key, name } => {
                out.insert(key.clone(), Value::String(name.clone()));
            }
            EdgeItem::Node { key, plan } => {
                let node = node_fragment(item, key);
                let mut path = base_path.to_vec();
                path.push(step.clone().with_id(id.clone()));
                let fragment = Fragment {
                    api,
                    value: &node,
                    path,
                };
                out.insert(key.clone(), stitch_object(plan, &[fragment]));
            }
        }
    }
    Value::Object(out)
}

/// The edge cursor: the raw key rendered as a string.
fn cursor(id: &Value) -> Value {
    match id {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

/// Rebuilds a node object from an item's `{nodeKey}.{alias}` entries.
fn node_fragment(item: &Value, node_key: &str) -> Value {
    let prefix = node_alias(node_key, "");
    let mut node = Map::new();
    if let Some(id) = item.get(KEY_ALIAS) {
        node.insert(KEY_ALIAS.to_string(), id.clone());
    }
    if let Some(entries) = item.as_object() {
        for (key, value) in entries {
            if let Some(stripped) = key.strip_prefix(&prefix) {
                node.insert(stripped.to_string(), value.clone());
            }
        }
    }
    Value::Object(node)
}

/// Assembles a mutation payload from the provider's answer.
///
/// `api` entries are left out; the caller fills them after re-querying.
pub fn stitch_payload(plan: &MutationFieldPlan<'_>, response: &Value) -> Map<String, Value> {
    let api = plan.mutation.api.as_str();
    let container = plan.container_path();
    let (step, base) = match container.split_last() {
        Some((last, init)) => (last.clone(), init.to_vec()),
        None => (PathStep::new(&plan.mutation.field.name), Vec::new()),
    };
    let node_path = |id: Value| {
        let mut path = base.clone();
        path.push(step.clone().with_id(id));
        path
    };
    let id = response
        .get(ID_REQUEST_ALIAS)
        .and_then(|result| result.get(KEY_ALIAS))
        .cloned()
        .unwrap_or(Value::Null);

    let mut out = Map::new();
    for item in &plan.payload.items {
        let (key, value) = match item {
            PayloadItem::Typename { key, name } => (key, Value::String(name.clone())),
            PayloadItem::Node { key, plan: node } => {
                let value = match response.get(key).filter(|v| v.is_object()) {
                    Some(result) => {
                        let fragment = Fragment {
                            api,
                            value: result,
                            path: node_path(id.clone()),
                        };
                        stitch_object(node, &[fragment])
                    }
                    None => Value::Null,
                };
                (key, value)
            }
            PayloadItem::Edge { key, edge } => {
                let value = match response.get(key).filter(|v| v.is_object()) {
                    Some(result) => stitch_edge(edge, api, &base, &step, result),
                    None => Value::Null,
                };
                (key, value)
            }
            PayloadItem::Errors { key, fields } => {
                let errors = response
                    .get(key)
                    .and_then(Value::as_array)
                    .map(|errors| {
                        errors
                            .iter()
                            .map(|error| {
                                let entry: Map<String, Value> = fields
                                    .iter()
                                    .map(|(alias, name)| {
                                        let value = if name == "__typename" {
                                            Value::String(ERROR_TYPE.to_string())
                                        } else {
                                            error.get(name).cloned().unwrap_or(Value::Null)
                                        };
                                        (alias.clone(), value)
                                    })
                                    .collect();
                                Value::Object(entry)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                (key, Value::Array(errors))
            }
            PayloadItem::DeletedId { key } => {
                let value = match response.get(key) {
                    Some(deleted) if !deleted.is_null() => GlobalId::new(api, node_path(deleted.clone())).to_value(),
                    _ => Value::Null,
                };
                (key, value)
            }
            PayloadItem::ClientMutationId { key } => (
                key,
                plan.input.get("clientMutationId").cloned().unwrap_or(Value::Null),
            ),
            PayloadItem::Api { .. } => continue,
        };
        out.insert(key.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::MergedSchema;
    use crate::plan::{Planner, RootPlan};
    use crate::query::{fields, Query, Selection};
    use kite_schema::{
        ApiDescription, ApiField, ApiObjectType, ApiType, FieldFlags, RecordingSecurityLogger, RequestContext,
        ScalarType,
    };
    use serde_json::json;

    fn provider(api: &str) -> ApiDescription {
        let order = ApiObjectType::new("Order")
            .with_field(ApiField::scalar("id", ScalarType::Integer, FieldFlags::IS_KEY | FieldFlags::QUERYABLE).unwrap())
            .with_field(ApiField::scalar("status", ScalarType::String, FieldFlags::QUERYABLE).unwrap());
        let mut description = ApiDescription::new(api, "Shop");
        description.fields = vec![
            ApiField::object("orders", "Order", FieldFlags::IS_CONNECTION | FieldFlags::QUERYABLE).unwrap(),
            ApiField::scalar("name", ScalarType::String, FieldFlags::QUERYABLE).unwrap(),
        ];
        description.types = vec![ApiType::Object(order)];
        description
    }

    #[test]
    fn test_connections_are_concatenated_in_provider_order() {
        let schema = MergedSchema::merge(&[provider("east"), provider("west")]).unwrap();
        let logger = RecordingSecurityLogger::new();
        let context = RequestContext::anonymous();
        let query = Query::new(vec![Selection::field("api")
            .select(vec![
                Selection::field("name").into(),
                Selection::field("orders")
                    .select(vec![
                        Selection::field("count").into(),
                        Selection::field("edges")
                            .select(vec![
                                Selection::field("cursor").into(),
                                Selection::field("node").alias("n").select(fields(["id", "status"])).into(),
                            ])
                            .into(),
                    ])
                    .into(),
            ])
            .into()]);
        let plan = Planner::new(&schema, &context, &logger, "node").plan_query(&query).unwrap();
        let RootPlan::Api { plan, .. } = &plan.roots[0] else {
            panic!("expected the api root");
        };

        let east = json!({ "name": "East", "orders": { "count": 3, "edges": [{ "__id": 1, "n.status": "open" }] } });
        let west = json!({ "name": "West", "orders": { "count": 2, "edges": [{ "__id": 9, "n.status": "paid" }] } });
        let value = stitch_object(plan, &[Fragment::root("east", &east), Fragment::root("west", &west)]);

        assert_eq!(value["name"], json!("East"));
        assert_eq!(value["orders"]["count"], json!(5));
        let edges = value["orders"]["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0]["cursor"], json!("1"));
        assert_eq!(edges[1]["n"]["status"], json!("paid"));

        let id = GlobalId::decode(edges[1]["n"]["id"].as_str().unwrap()).unwrap();
        assert_eq!(id, GlobalId::new("west", vec![PathStep::new("orders").with_id(json!(9))]));
    }

    #[test]
    fn test_node_aliases_with_shared_prefixes_stay_apart() {
        let schema = MergedSchema::merge(&[provider("shop")]).unwrap();
        let logger = RecordingSecurityLogger::new();
        let context = RequestContext::anonymous();
        let query = Query::new(vec![Selection::field("api")
            .select(vec![Selection::field("orders")
                .select(vec![Selection::field("edges")
                    .select(vec![
                        Selection::field("node")
                            .alias("a")
                            .select(vec![Selection::field("status").alias("b_c").into()])
                            .into(),
                        Selection::field("node")
                            .alias("a_b")
                            .select(vec![Selection::field("status").alias("c").into()])
                            .into(),
                    ])
                    .into()])
                .into()])
            .into()]);
        let plan = Planner::new(&schema, &context, &logger, "node").plan_query(&query).unwrap();
        let RootPlan::Api { plan, .. } = &plan.roots[0] else {
            panic!("expected the api root");
        };

        let requests = plan.requests("shop");
        let items = &requests[0].sub_fields()[0];
        let aliases: Vec<_> = items.sub_fields().iter().map(|r| r.response_key()).collect();
        assert_eq!(aliases, vec!["__id", "a.b_c", "a_b.c"]);

        let answer = json!({ "orders": { "edges": [{ "__id": 1, "a.b_c": "open", "a_b.c": "paid" }] } });
        let value = stitch_object(plan, &[Fragment::root("shop", &answer)]);
        let edge = &value["orders"]["edges"][0];
        assert_eq!(edge["a"], json!({ "b_c": "open" }));
        assert_eq!(edge["a_b"], json!({ "c": "paid" }));
    }

    #[test]
    fn test_missing_fragments_resolve_to_null() {
        let schema = MergedSchema::merge(&[provider("shop")]).unwrap();
        let logger = RecordingSecurityLogger::new();
        let context = RequestContext::anonymous();
        let query = Query::new(vec![Selection::field("api")
            .select(vec![Selection::field("orders").select(fields(["count"])).into(), Selection::field("__typename").into()])
            .into()]);
        let plan = Planner::new(&schema, &context, &logger, "node").plan_query(&query).unwrap();
        let RootPlan::Api { plan, .. } = &plan.roots[0] else {
            panic!("expected the api root");
        };

        assert_eq!(stitch_object(plan, &[]), json!({ "orders": null, "__typename": "Api" }));
        assert_eq!(cursor(&json!("a-1")), json!("a-1"));
    }
}
