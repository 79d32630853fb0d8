use async_trait::async_trait;
use futures::FutureExt;
use kite_gateway::query::fields;
use kite_gateway::{
    CancellationToken, Gateway, GatewayConfig, GlobalId, LocalTransport, Query, Selection,
};
use kite_provider::{ApiObject, ApiProvider, NodeConnection, ObjectBuilder, ResolverError, VecConnection};
use kite_schema::{
    AccessTicket, ApiDescription, ApiEndpoint, ApiRequest, AuthorizationRule, ConnectionAction,
    ConnectionActions, EndpointError, LogAccessRule, RecordingSecurityLogger, RequestContext, ScalarType,
    ScalarValue, SecurityLogType, Severity, UserDescription,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
struct Order {
    id: i64,
    status: String,
    total: i64,
    margin: i64,
}

impl ApiObject for Order {
    const TYPE_NAME: &'static str = "Order";

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder
            .key("id", ScalarType::Integer, |o: &Order| o.id)
            .settable(|o, v| {
                if let ScalarValue::Integer(id) = v {
                    o.id = id;
                }
            });
        builder
            .scalar("status", ScalarType::String, |o: &Order| o.status.clone())
            .filterable()
            .settable(|o, v| o.status = v.as_str().unwrap_or_default().to_string());
        builder
            .scalar("total", ScalarType::Integer, |o: &Order| o.total)
            .filterable()
            .settable(|o, v| {
                if let ScalarValue::Integer(total) = v {
                    o.total = total;
                }
            });
        builder
            .scalar("margin", ScalarType::Integer, |o: &Order| o.margin)
            .authorize(AuthorizationRule::new("finance"))
            .log_access(LogAccessRule::new(Severity::Major, "margin read"));
        builder.forward("audit", ScalarType::String, |_: &Order, _request, _context| {
            async { Err(ResolverError::Failed("audit log offline".to_string())) }.boxed()
        });
    }
}

struct Sales {
    orders: Arc<VecConnection<Order>>,
}

impl ApiObject for Sales {
    const TYPE_NAME: &'static str = "SalesApi";

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder
            .node_connection("orders", |s: &Sales| {
                Arc::clone(&s.orders) as Arc<dyn NodeConnection<Order>>
            })
            .authorize(
                AuthorizationRule::new("orders")
                    .with_action_name()
                    .for_actions(ConnectionActions::of(&[
                        ConnectionAction::Create,
                        ConnectionAction::Update,
                        ConnectionAction::Delete,
                    ])),
            );
        builder.forward("forecast", ScalarType::Integer, |_: &Sales, _request, _context| {
            async { Err(ResolverError::Failed("forecast model missing".to_string())) }.boxed()
        });
    }
}

/// Sales orders whose deletion needs an administrator.
struct Guarded {
    orders: Arc<VecConnection<Order>>,
}

impl ApiObject for Guarded {
    const TYPE_NAME: &'static str = "GuardedApi";

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder
            .node_connection("orders", |g: &Guarded| {
                Arc::clone(&g.orders) as Arc<dyn NodeConnection<Order>>
            })
            .authorize(AuthorizationRule::new("admin").for_actions(ConnectionAction::Delete.into()));
    }
}

/// The shipping view of an order.
#[derive(Debug, Clone, Default)]
struct Parcel {
    id: i64,
    status: String,
    carrier: String,
}

impl ApiObject for Parcel {
    const TYPE_NAME: &'static str = "Order";

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder.key("id", ScalarType::Integer, |p: &Parcel| p.id);
        builder
            .scalar("status", ScalarType::String, |p: &Parcel| p.status.clone())
            .filterable();
        builder.scalar("carrier", ScalarType::String, |p: &Parcel| p.carrier.clone());
    }
}

struct Shipping {
    parcels: Vec<Parcel>,
}

impl ApiObject for Shipping {
    const TYPE_NAME: &'static str = "ShippingApi";

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder.connection("orders", |s: &Shipping| s.parcels.clone());
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Down,
    Slow(Duration),
}

/// Wraps a provider and misbehaves on queries.
struct Faulty {
    inner: Arc<dyn ApiEndpoint>,
    fault: Fault,
}

#[async_trait]
impl ApiEndpoint for Faulty {
    fn description(&self) -> &ApiDescription {
        self.inner.description()
    }

    async fn query(&self, requests: &[ApiRequest], context: &RequestContext) -> Result<Value, EndpointError> {
        match self.fault {
            Fault::Down => Err(EndpointError::Failed("maintenance".to_string())),
            Fault::Slow(delay) => {
                tokio::time::sleep(delay).await;
                self.inner.query(requests, context).await
            }
        }
    }

    async fn mutate(&self, request: &ApiRequest, context: &RequestContext) -> Result<Value, EndpointError> {
        self.inner.mutate(request, context).await
    }
}

fn order(id: i64, status: &str, total: i64) -> Order {
    Order {
        id,
        status: status.to_string(),
        total,
        margin: total / 3,
    }
}

fn parcel(id: i64, status: &str, carrier: &str) -> Parcel {
    Parcel {
        id,
        status: status.to_string(),
        carrier: carrier.to_string(),
    }
}

fn sales() -> Arc<dyn ApiEndpoint> {
    let orders = VecConnection::new(vec![order(1, "open", 30), order(2, "closed", 12), order(3, "reopened", 7)]);
    Arc::new(ApiProvider::new(
        "sales",
        Sales {
            orders: Arc::new(orders),
        },
    ))
}

fn shipping() -> Arc<dyn ApiEndpoint> {
    Arc::new(ApiProvider::new(
        "shipping",
        Shipping {
            parcels: vec![parcel(10, "open", "dhl"), parcel(11, "in transit", "ups")],
        },
    ))
}

async fn gateway(transport: LocalTransport, config: GatewayConfig) -> Gateway {
    let gateway = Gateway::new(transport, config);
    gateway.refresh().await.unwrap();
    gateway
}

fn clerk() -> RequestContext {
    RequestContext::with_ticket(
        AccessTicket::for_client("backoffice")
            .with_user(UserDescription::new("clerk", "7"))
            .with_user_scope(["orders.Create", "orders.Update", "orders.Delete"]),
    )
}

fn open_orders(node: Vec<&str>) -> Query {
    Query::new(vec![Selection::field("api")
        .select(vec![Selection::field("orders")
            .arguments(json!({ "filter": { "status_contains": "open" } }))
            .select(vec![
                Selection::field("count").into(),
                Selection::field("edges")
                    .select(vec![
                        Selection::field("cursor").into(),
                        Selection::field("node").select(fields(node)).into(),
                    ])
                    .into(),
            ])
            .into()])
        .into()])
}

fn edges(data: &Value) -> &Vec<Value> {
    data["api"]["orders"]["edges"].as_array().unwrap()
}

#[tokio::test]
async fn test_connections_concatenate_across_providers() {
    let transport = LocalTransport::new().with_endpoint(sales()).with_endpoint(shipping());
    let gateway = gateway(transport, GatewayConfig::default()).await;

    let response = gateway
        .resolve_query(&open_orders(vec!["status", "total", "carrier"]), &RequestContext::anonymous())
        .await;
    assert!(!response.has_errors(), "{:?}", response.errors);
    let data = response.data.unwrap();

    assert_eq!(data["api"]["orders"]["count"], json!(3));
    let nodes: Vec<&Value> = edges(&data).iter().map(|edge| &edge["node"]).collect();
    assert_eq!(
        nodes,
        vec![
            &json!({ "status": "open", "total": 30, "carrier": null }),
            &json!({ "status": "reopened", "total": 7, "carrier": null }),
            &json!({ "status": "open", "total": null, "carrier": "dhl" }),
        ]
    );
    let cursors: Vec<&Value> = edges(&data).iter().map(|edge| &edge["cursor"]).collect();
    assert_eq!(cursors, vec![&json!("1"), &json!("3"), &json!("10")]);
}

#[tokio::test]
async fn test_global_ids_locate_nodes() {
    let transport = LocalTransport::new().with_endpoint(sales()).with_endpoint(shipping());
    let gateway = gateway(transport, GatewayConfig::default()).await;
    let context = RequestContext::anonymous();

    let response = gateway.resolve_query(&open_orders(vec!["id", "status"]), &context).await;
    let data = response.data.unwrap();
    let id = edges(&data)[2]["node"]["id"].as_str().unwrap().to_string();

    let global = GlobalId::decode(&id).unwrap();
    assert_eq!(global.api, "shipping");
    assert_eq!(global.path.len(), 1);
    assert_eq!(global.path[0].field, "orders");
    assert_eq!(global.path[0].id, Some(json!(10)));
    assert!(global.path[0].arguments.is_empty());

    let lookup = Query::new(vec![Selection::field("node")
        .arguments(json!({ "id": id }))
        .select(fields(["id", "status", "carrier", "total"]))
        .into()]);
    let response = gateway.resolve_query(&lookup, &context).await;
    assert!(!response.has_errors(), "{:?}", response.errors);
    let data = response.data.unwrap();
    let node = &data["node"];
    assert_eq!(node["status"], json!("open"));
    assert_eq!(node["carrier"], json!("dhl"));
    assert_eq!(node["total"], Value::Null);
    assert_eq!(GlobalId::decode(node["id"].as_str().unwrap()).unwrap(), global);

    let invalid = Query::new(vec![Selection::field("node")
        .arguments(json!({ "id": "not an id" }))
        .select(fields(["id"]))
        .into()]);
    let response = gateway.resolve_query(&invalid, &context).await;
    assert_eq!(response.data.as_ref().unwrap()["node"], Value::Null);
    assert_eq!(response.error_codes(), vec!["INVALID_GLOBAL_ID"]);

    let gone = GlobalId::new(
        "shipping",
        vec![kite_gateway::PathStep::new("orders").with_id(json!(99))],
    )
    .encode()
    .unwrap();
    let missing = Query::new(vec![Selection::field("node")
        .arguments(json!({ "id": gone }))
        .select(fields(["id"]))
        .into()]);
    let response = gateway.resolve_query(&missing, &context).await;
    assert_eq!(response.data.as_ref().unwrap()["node"], Value::Null);
    assert_eq!(response.error_codes(), vec!["NOT_FOUND"]);
}

#[tokio::test]
async fn test_unauthorized_fields_are_pruned_once() {
    let logger = Arc::new(RecordingSecurityLogger::new());
    let transport = LocalTransport::new().with_endpoint(sales()).with_endpoint(shipping());
    let gateway = gateway(transport, GatewayConfig::default())
        .await
        .with_security_logger(logger.clone());

    let response = gateway
        .resolve_query(&open_orders(vec!["status", "margin"]), &RequestContext::anonymous())
        .await;
    assert!(!response.has_errors());
    let data = response.data.unwrap();
    assert!(edges(&data).iter().all(|edge| edge["node"]["margin"].is_null()));

    let records = logger.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].log_type, SecurityLogType::OperationDenied);
    assert_eq!(records[0].severity, Severity::Major);
    assert_eq!(records[0].message(), "Unauthorized call to Order.margin");
}

#[tokio::test]
async fn test_failing_provider_only_nulls_its_share() {
    let transport = LocalTransport::new().with_endpoint(sales()).with_endpoint(Arc::new(Faulty {
        inner: shipping(),
        fault: Fault::Down,
    }));
    let gateway = gateway(transport, GatewayConfig::default()).await;

    let response = gateway
        .resolve_query(&open_orders(vec!["status"]), &RequestContext::anonymous())
        .await;
    let data = response.data.as_ref().unwrap();
    assert_eq!(data["api"]["orders"]["count"], json!(2));
    assert_eq!(edges(data).len(), 2);

    assert_eq!(response.error_codes(), vec!["PROVIDER_UNAVAILABLE"]);
    let error = &response.errors[0];
    assert_eq!(error.extensions["provider"], json!("shipping"));
    assert_eq!(serde_json::to_value(&error.path).unwrap(), json!(["api"]));
}

#[tokio::test]
async fn test_resolution_errors_reach_the_response() {
    let transport = LocalTransport::new().with_endpoint(sales()).with_endpoint(shipping());
    let gateway = gateway(transport, GatewayConfig::default()).await;

    let mut query = open_orders(vec!["status", "audit"]);
    let Selection::Field(api) = &mut query.selections[0] else {
        unreachable!()
    };
    api.selections.push(Selection::field("forecast").alias("outlook").into());

    let response = gateway.resolve_query(&query, &RequestContext::anonymous()).await;
    let data = response.data.as_ref().unwrap();
    assert_eq!(data["api"]["outlook"], Value::Null);
    assert_eq!(data["api"]["orders"]["count"], json!(3));
    assert!(edges(data).iter().all(|edge| edge["node"]["audit"].is_null()));

    assert_eq!(response.error_codes(), vec!["RESOLUTION_FAILED"; 3]);
    let paths: Vec<Value> = response
        .errors
        .iter()
        .map(|error| serde_json::to_value(&error.path).unwrap())
        .collect();
    assert_eq!(paths.iter().filter(|path| **path == json!(["api", "outlook"])).count(), 1);
    assert_eq!(paths.iter().filter(|path| **path == json!(["api", "orders"])).count(), 2);
    assert!(response.errors.iter().all(|error| error.extensions["provider"] == json!("sales")));
    let outlook = response
        .errors
        .iter()
        .find(|error| error.message.contains("forecast"))
        .unwrap();
    assert_eq!(outlook.message, "forecast model missing");
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let transport = LocalTransport::new().with_endpoint(sales()).with_endpoint(Arc::new(Faulty {
        inner: shipping(),
        fault: Fault::Slow(Duration::from_secs(5)),
    }));
    let config = GatewayConfig::new().with_dispatch_timeout(Duration::from_millis(50));
    let gateway = gateway(transport, config).await;

    let response = gateway
        .resolve_query(&open_orders(vec!["status"]), &RequestContext::anonymous())
        .await;
    assert_eq!(edges(response.data.as_ref().unwrap()).len(), 2);
    assert_eq!(response.error_codes(), vec!["PROVIDER_UNAVAILABLE"]);
    assert!(response.errors[0].message.contains("did not answer"));
}

#[tokio::test]
async fn test_cancellation_abandons_the_request() {
    let transport = LocalTransport::new().with_endpoint(Arc::new(Faulty {
        inner: sales(),
        fault: Fault::Slow(Duration::from_secs(5)),
    }));
    let gateway = gateway(transport, GatewayConfig::default()).await;
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let response = gateway
        .resolve_query_with_cancellation(&open_orders(vec!["status"]), &RequestContext::anonymous(), &token)
        .await;
    assert!(response.data.is_none());
    assert_eq!(response.error_codes(), vec!["CANCELLED"]);
}

#[tokio::test]
async fn test_mutation_payload_carries_global_ids() {
    let transport = LocalTransport::new().with_endpoint(sales()).with_endpoint(shipping());
    let gateway = gateway(transport, GatewayConfig::default()).await;
    let context = clerk();

    let create = Query::new(vec![Selection::field("sales_orders_create")
        .alias("created")
        .arguments(json!({
            "input": {
                "newNode": { "id": 4, "status": "open", "total": 5 },
                "clientMutationId": "c-1"
            }
        }))
        .select(vec![
            Selection::field("node").select(fields(["id", "status"])).into(),
            Selection::field("errors").select(fields(["message"])).into(),
            Selection::field("clientMutationId").into(),
            Selection::field("api")
                .select(vec![Selection::field("orders").select(fields(["count"])).into()])
                .into(),
        ])
        .into()]);
    let response = gateway.resolve_mutation(&create, &context).await;
    assert!(!response.has_errors(), "{:?}", response.errors);
    let data = response.data.unwrap();
    let created = &data["created"];
    assert_eq!(created["node"]["status"], json!("open"));
    assert_eq!(created["errors"], json!([]));
    assert_eq!(created["clientMutationId"], json!("c-1"));
    assert_eq!(created["api"]["orders"]["count"], json!(6));

    let node_id = GlobalId::decode(created["node"]["id"].as_str().unwrap()).unwrap();
    assert_eq!(node_id.api, "sales");
    assert_eq!(node_id.path[0].id, Some(json!(4)));

    let delete = Query::new(vec![Selection::field("sales_orders_delete")
        .arguments(json!({ "input": { "id": 2 } }))
        .select(fields(["deletedId"]))
        .into()]);
    let response = gateway.resolve_mutation(&delete, &context).await;
    let deleted = response.data.unwrap()["sales_orders_delete"]["deletedId"].clone();
    let deleted = GlobalId::decode(deleted.as_str().unwrap()).unwrap();
    assert_eq!(deleted.path[0].field, "orders");
    assert_eq!(deleted.path[0].id, Some(json!(2)));
}

#[tokio::test]
async fn test_denied_mutation_is_null_and_logged() {
    let logger = Arc::new(RecordingSecurityLogger::new());
    let transport = LocalTransport::new().with_endpoint(sales());
    let gateway = gateway(transport, GatewayConfig::default())
        .await
        .with_security_logger(logger.clone());

    let delete = Query::new(vec![Selection::field("sales_orders_delete")
        .alias("remove")
        .arguments(json!({ "input": { "id": 1 } }))
        .select(fields(["deletedId"]))
        .into()]);
    let response = gateway.resolve_mutation(&delete, &RequestContext::anonymous()).await;
    assert!(!response.has_errors());
    assert_eq!(response.data.unwrap(), json!({ "remove": null }));

    let records = logger.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].log_type, SecurityLogType::OperationDenied);
}

#[tokio::test]
async fn test_action_scoped_rules_only_gate_their_action() {
    let logger = Arc::new(RecordingSecurityLogger::new());
    let guarded = ApiProvider::new(
        "guarded",
        Guarded {
            orders: Arc::new(VecConnection::new(vec![order(1, "open", 30)])),
        },
    );
    let transport = LocalTransport::new().with_endpoint(Arc::new(guarded));
    let gateway = gateway(transport, GatewayConfig::default())
        .await
        .with_security_logger(logger.clone());
    let context = RequestContext::with_ticket(
        AccessTicket::for_client("backoffice").with_user(UserDescription::new("clerk", "7")),
    );

    let create = Query::new(vec![Selection::field("guarded_orders_create")
        .arguments(json!({ "input": { "newNode": { "id": 2, "status": "open", "total": 4 } } }))
        .select(vec![
            Selection::field("node").select(fields(["status"])).into(),
            Selection::field("api")
                .select(vec![Selection::field("orders").select(fields(["count"])).into()])
                .into(),
        ])
        .into()]);
    let response = gateway.resolve_mutation(&create, &context).await;
    assert!(!response.has_errors(), "{:?}", response.errors);
    let data = response.data.unwrap();
    assert_eq!(data["guarded_orders_create"]["node"]["status"], json!("open"));
    assert_eq!(data["guarded_orders_create"]["api"]["orders"]["count"], json!(2));
    assert!(logger
        .take()
        .iter()
        .all(|record| record.log_type != SecurityLogType::OperationDenied));

    let delete = Query::new(vec![Selection::field("guarded_orders_delete")
        .arguments(json!({ "input": { "id": 1 } }))
        .select(fields(["deletedId"]))
        .into()]);
    let response = gateway.resolve_mutation(&delete, &context).await;
    assert_eq!(response.data.unwrap(), json!({ "guarded_orders_delete": null }));
    let records = logger.take();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].log_type, SecurityLogType::OperationDenied);
}

#[tokio::test]
async fn test_schema_lifecycle() {
    let gateway = Gateway::new(LocalTransport::new().with_endpoint(sales()), GatewayConfig::default());
    let query = open_orders(vec!["status"]);

    let response = gateway.resolve_query(&query, &RequestContext::anonymous()).await;
    assert_eq!(response.error_codes(), vec!["SCHEMA_UNAVAILABLE"]);
    assert!(gateway.schema().await.is_none());

    let first = gateway.refresh().await.unwrap();
    let again = gateway.refresh().await.unwrap();
    assert_eq!(first.generation(), 1);
    assert!(Arc::ptr_eq(&first, &again));

    let sdl = gateway.schema().await.unwrap().to_sdl();
    assert!(sdl.contains("type Query"));
    assert!(sdl.contains("sales_orders_create"));

    let limited = Gateway::new(
        LocalTransport::new().with_endpoint(sales()),
        GatewayConfig::new().with_max_depth(2),
    );
    limited.refresh().await.unwrap();
    let response = limited.resolve_query(&query, &RequestContext::anonymous()).await;
    assert!(response.data.is_none());
    assert_eq!(response.error_codes(), vec!["MAX_DEPTH_EXCEEDED"]);

    let unknown = Query::new(vec![Selection::field("api").select(fields(["nope"])).into()]);
    let response = gateway.resolve_query(&unknown, &RequestContext::anonymous()).await;
    assert_eq!(response.error_codes(), vec!["UNKNOWN_FIELD"]);
}
