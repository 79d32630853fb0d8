use futures::future::FutureExt;
use kite_provider::{
    ApiEnum, ApiObject, ApiProvider, NodeConnection, ObjectBuilder, ResolverError, VecConnection,
};
use kite_schema::{
    AccessTicket, ApiEndpoint, ApiRequest, AuthorizationRule, ConnectionAction, ConnectionActions,
    EndpointError, FieldFlags, LogAccessRule, MutationKind, RecordingSecurityLogger, RequestContext,
    ResolutionError, ScalarType, ScalarValue, SecurityLogType, Severity, UserDescription,
};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Status {
    #[default]
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

#[derive(Debug, Clone, Default, PartialEq)]
struct Order {
    id: i64,
    item: String,
    quantity: i64,
    status: Status,
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
            .scalar("item", ScalarType::String, |o: &Order| o.item.clone())
            .filterable()
            .sortable()
            .settable(|o, v| o.item = v.as_str().unwrap_or_default().to_string());
        builder
            .scalar("quantity", ScalarType::Integer, |o: &Order| o.quantity)
            .filterable()
            .settable(|o, v| {
                if let ScalarValue::Integer(q) = v {
                    o.quantity = q;
                }
            });
        builder.enumeration("status", |o: &Order| o.status);
    }
}

struct Shop {
    name: String,
    orders: Arc<VecConnection<Order>>,
}

impl ApiObject for Shop {
    const TYPE_NAME: &'static str = "ShopApi";
    const DESCRIPTION: Option<&'static str> = Some("Order management");

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder.scalar("name", ScalarType::String, |s: &Shop| s.name.clone());
        builder
            .node_connection("orders", |s: &Shop| {
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
            )
            .log_access(LogAccessRule::new(Severity::Minor, "{ApiPath} changed"));
        builder.forward("motd", ScalarType::String, |s: &Shop, _request, _context| {
            let text = format!("welcome to {}", s.name);
            async move { Ok(Value::String(text)) }.boxed()
        });
        builder.forward("broken", ScalarType::String, |_: &Shop, _request, _context| {
            async { Err(ResolverError::Failed("backend down".to_string())) }.boxed()
        });
    }
}

fn order(id: i64, item: &str, quantity: i64) -> Order {
    Order {
        id,
        item: item.to_string(),
        quantity,
        status: Status::Open,
    }
}

fn provider(logger: Arc<RecordingSecurityLogger>) -> ApiProvider<Shop> {
    let shop = Shop {
        name: "corner shop".to_string(),
        orders: Arc::new(VecConnection::new(vec![
            order(1, "apples", 3),
            order(2, "pears", 10),
            order(3, "plums", 7),
        ])),
    };
    ApiProvider::new("shop", shop)
        .with_version("1.2.0")
        .with_security_logger(logger)
}

fn clerk() -> RequestContext {
    RequestContext::with_ticket(
        AccessTicket::for_client("backoffice")
            .with_user(UserDescription::new("clerk", "7"))
            .with_user_scope(["orders.Create", "orders.Update", "orders.Delete"]),
    )
}

#[test]
fn test_description_is_assembled_from_registrations() {
    let provider = provider(Arc::new(RecordingSecurityLogger::new()));
    let description = provider.description();

    assert_eq!(description.api_name, "shop");
    assert_eq!(description.type_name, "ShopApi");
    assert_eq!(description.version, "1.2.0");
    assert!(provider.generation_errors().is_empty());

    let orders = description.fields.iter().find(|f| f.name == "orders").unwrap();
    assert!(orders.flags.contains(FieldFlags::IS_CONNECTION));
    let arguments: Vec<_> = orders.arguments.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(arguments, vec!["filter", "sort", "id", "limit", "offset"]);

    let mut types: Vec<_> = description.types.iter().map(|t| t.type_name()).collect();
    types.sort_unstable();
    assert_eq!(types, vec!["Order", "Order_Filter", "Order_Sort", "Status"]);

    let mutations: Vec<_> = description
        .mutations
        .iter()
        .map(|m| (m.field.name.as_str(), m.kind))
        .collect();
    assert_eq!(
        mutations,
        vec![
            ("orders.create", MutationKind::Create),
            ("orders.update", MutationKind::Update),
            ("orders.delete", MutationKind::Delete),
        ]
    );
    let update = &description.mutations[1].field;
    let arguments: Vec<_> = update.arguments.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(arguments, vec!["id", "newNode"]);
    assert_eq!(update.authorization_rules.len(), 1);
}

#[tokio::test]
async fn test_query_through_endpoint() {
    let provider = provider(Arc::new(RecordingSecurityLogger::new()));
    let requests = vec![
        ApiRequest::new("name"),
        ApiRequest::new("motd"),
        ApiRequest::new("broken"),
        ApiRequest::new("orders")
            .with_alias("big")
            .with_arguments(json!({ "filter": { "quantity_gte": 5 }, "sort": ["item_desc"] }))
            .with_fields(vec![
                ApiRequest::new("count"),
                ApiRequest::new("items").with_fields(vec![
                    ApiRequest::new("id").with_alias("__id"),
                    ApiRequest::new("item"),
                    ApiRequest::new("status"),
                ]),
            ]),
    ];

    let mut value = provider.query(&requests, &RequestContext::anonymous()).await.unwrap();
    let errors = ResolutionError::take_from(&mut value);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, vec!["broken"]);
    assert!(errors[0].message.contains("backend down"));
    assert_eq!(
        value,
        json!({
            "name": "corner shop",
            "motd": "welcome to corner shop",
            "broken": null,
            "big": {
                "count": 2,
                "items": [
                    { "__id": 3, "item": "plums", "status": "Open" },
                    { "__id": 2, "item": "pears", "status": "Open" }
                ]
            }
        })
    );
}

#[tokio::test]
async fn test_mutations_update_the_connection() {
    let logger = Arc::new(RecordingSecurityLogger::new());
    let provider = provider(Arc::clone(&logger));
    let payload_fields = vec![
        ApiRequest::new("result").with_fields(vec![
            ApiRequest::new("id"),
            ApiRequest::new("item"),
            ApiRequest::new("quantity"),
        ]),
        ApiRequest::new("errors").with_fields(vec![ApiRequest::new("message")]),
        ApiRequest::new("deletedId"),
        ApiRequest::new("clientMutationId"),
    ];

    let create = ApiRequest::new("orders.create")
        .with_arguments(json!({
            "newNode": { "id": 4, "item": "figs", "quantity": 1 },
            "clientMutationId": "c-1"
        }))
        .with_fields(payload_fields.clone());
    let value = provider.mutate(&create, &clerk()).await.unwrap();
    assert_eq!(
        value,
        json!({
            "result": { "id": 4, "item": "figs", "quantity": 1 },
            "errors": [],
            "deletedId": null,
            "clientMutationId": "c-1"
        })
    );

    let update = ApiRequest::new("orders.update")
        .with_arguments(json!({ "id": 2, "newNode": { "quantity": 12 } }))
        .with_fields(payload_fields.clone());
    let value = provider.mutate(&update, &clerk()).await.unwrap();
    assert_eq!(value["result"], json!({ "id": 2, "item": "pears", "quantity": 12 }));

    let delete = ApiRequest::new("orders.delete")
        .with_arguments(json!({ "id": 1 }))
        .with_fields(payload_fields.clone());
    let value = provider.mutate(&delete, &clerk()).await.unwrap();
    assert_eq!(value["deletedId"], json!(1));

    let missing = ApiRequest::new("orders.delete")
        .with_arguments(json!({ "id": 99 }))
        .with_fields(payload_fields);
    let value = provider.mutate(&missing, &clerk()).await.unwrap();
    assert_eq!(value["result"], Value::Null);
    assert_eq!(value["errors"], json!([{ "message": "node not found" }]));

    let remaining: Vec<_> = provider.root().orders.snapshot().await.into_iter().map(|o| o.id).collect();
    assert_eq!(remaining, vec![2, 3, 4]);

    let kinds: Vec<_> = logger.take().into_iter().map(|r| r.log_type).collect();
    assert_eq!(
        kinds,
        vec![
            SecurityLogType::DataCreateGranted,
            SecurityLogType::DataUpdateGranted,
            SecurityLogType::DataDeleteGranted,
        ]
    );
}

#[tokio::test]
async fn test_mutation_errors() {
    let logger = Arc::new(RecordingSecurityLogger::new());
    let provider = provider(Arc::clone(&logger));

    let denied = ApiRequest::new("orders.delete").with_arguments(json!({ "id": 1 }));
    let error = provider.mutate(&denied, &RequestContext::anonymous()).await.unwrap_err();
    assert!(matches!(error, EndpointError::Failed(ref message) if message.contains("not authorized")));
    assert_eq!(logger.take()[0].log_type, SecurityLogType::OperationDenied);

    let unknown = ApiRequest::new("orders.archive");
    assert_eq!(
        provider.mutate(&unknown, &clerk()).await.unwrap_err(),
        EndpointError::UnknownMutation("orders.archive".to_string())
    );

    let not_a_connection = ApiRequest::new("name.create");
    assert!(matches!(
        provider.mutate(&not_a_connection, &clerk()).await,
        Err(EndpointError::UnknownMutation(_))
    ));

    let bad_id = ApiRequest::new("orders.update").with_arguments(json!({ "id": "seven", "newNode": {} }));
    assert!(matches!(
        provider.mutate(&bad_id, &clerk()).await,
        Err(EndpointError::Failed(_))
    ));
}

struct Careless;

impl ApiObject for Careless {
    const TYPE_NAME: &'static str = "CarelessApi";

    fn describe(builder: &mut ObjectBuilder<Self>) {
        builder.scalar("name", ScalarType::String, |_: &Careless| "a");
        builder.scalar("name", ScalarType::Integer, |_: &Careless| 1);
    }
}

#[tokio::test]
async fn test_generation_errors_do_not_stop_the_provider() {
    let provider = ApiProvider::new("careless", Careless);
    assert_eq!(
        provider.generation_errors(),
        ["CarelessApi: field `name` is declared more than once".to_string()]
    );
    assert_eq!(provider.description().fields.len(), 1);

    let value = provider
        .query(&[ApiRequest::new("name")], &RequestContext::anonymous())
        .await
        .unwrap();
    assert_eq!(value, json!({ "name": "a" }));
}
