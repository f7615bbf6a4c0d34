use axum::body::Bytes;
use axum::http::header::{ACCEPT, ALLOW, CONTENT_TYPE, LOCATION, X_CONTENT_TYPE_OPTIONS};
use axum::http::{Method, Request, StatusCode};
use fxhash::FxHashMap;
use serde::Serialize;
use serde_json::{json, Value};
use springtime_bus::bus::{BusMiddleware, Next as BusNext};
use springtime_bus::error::BusError;
use springtime_bus::future::{BoxFuture, FutureExt};
use springtime_bus::handler::MessageHandler;
use springtime_bus::input::Input;
use springtime_bus::message::{FromInput, Message};
use springtime_bus::read_model::Reply;
use springtime_bus::ErrorPtr;
use springtime_cqrs::assembly::ApplicationAssembler;
use springtime_cqrs::config::AssemblyConfig;
use springtime_cqrs::container::Container;
use springtime_cqrs::declaration::{
    BusMiddlewareDeclaration, HandlerDeclaration, MiddlewareDeclaration, RouteDeclaration,
};
use springtime_cqrs::graph::ApplicationGraph;
use springtime_cqrs::http::error::{HttpError, Problem};
use springtime_cqrs::http::middleware::{Middleware, Next};
use springtime_cqrs::http::{HttpRequest, HttpResponse};
use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

type Store = Arc<Mutex<FxHashMap<String, Thing>>>;

#[derive(Clone, Debug, Serialize)]
struct Thing {
    id: String,
    name: String,
}

fn missing(field: &str) -> ErrorPtr {
    Arc::new(Error::new(
        ErrorKind::InvalidInput,
        format!("missing {field}"),
    ))
}

struct CreateThing {
    id: String,
    name: String,
}

impl FromInput for CreateThing {
    fn from_input(input: &Input) -> Result<Self, ErrorPtr> {
        Ok(CreateThing {
            id: input
                .generated_id()
                .ok_or_else(|| missing("id"))?
                .to_string(),
            name: input.get_str("name").ok_or_else(|| missing("name"))?.to_string(),
        })
    }
}

struct RemoveThing {
    id: String,
}

impl FromInput for RemoveThing {
    fn from_input(input: &Input) -> Result<Self, ErrorPtr> {
        Ok(RemoveThing {
            id: input.get_str("id").ok_or_else(|| missing("id"))?.to_string(),
        })
    }
}

struct RenameThing {
    id: String,
    name: String,
}

impl FromInput for RenameThing {
    fn from_input(input: &Input) -> Result<Self, ErrorPtr> {
        Ok(RenameThing {
            id: input.get_str("id").ok_or_else(|| missing("id"))?.to_string(),
            name: input.get_str("name").ok_or_else(|| missing("name"))?.to_string(),
        })
    }
}

struct FetchThing {
    id: String,
}

impl FromInput for FetchThing {
    fn from_input(input: &Input) -> Result<Self, ErrorPtr> {
        Ok(FetchThing {
            id: input.get_str("id").ok_or_else(|| missing("id"))?.to_string(),
        })
    }
}

struct ThingCommands {
    store: Store,
}

impl MessageHandler for ThingCommands {
    fn handle(&self, message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
        async move {
            if let Some(command) = message.payload::<CreateThing>() {
                if command.name == "Testing" {
                    return Err(BusError::Handler(Arc::new(Problem::new(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "Name not allowed",
                        "\"Testing\" is a forbidden name in this application",
                    ))));
                }

                self.store.lock().unwrap().insert(
                    command.id.clone(),
                    Thing {
                        id: command.id.clone(),
                        name: command.name.clone(),
                    },
                );
            } else if let Some(command) = message.payload::<RenameThing>() {
                if let Some(thing) = self.store.lock().unwrap().get_mut(&command.id) {
                    thing.name = command.name.clone();
                }
            } else if let Some(command) = message.payload::<RemoveThing>() {
                self.store.lock().unwrap().remove(&command.id);
            }

            Ok(Reply::Empty)
        }
        .boxed()
    }
}

struct ThingQueries {
    store: Store,
}

impl MessageHandler for ThingQueries {
    fn handle(&self, message: Message) -> BoxFuture<'_, Result<Reply, BusError>> {
        async move {
            let query = message
                .payload::<FetchThing>()
                .ok_or_else(|| BusError::UnknownMessage(message.name().to_string()))?;

            self.store
                .lock()
                .unwrap()
                .get(&query.id)
                .cloned()
                .map(Reply::domain)
                .ok_or_else(|| {
                    BusError::Handler(Arc::new(Problem::from_status(
                        StatusCode::NOT_FOUND,
                        format!("Thing \"{}\" does not exist", query.id),
                    )))
                })
        }
        .boxed()
    }
}

struct Stamp;

impl Middleware for Stamp {
    fn process<'a>(
        &'a self,
        request: HttpRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        async move {
            let mut response = next.run(request).await?;
            response
                .headers_mut()
                .insert("x-admin", "true".parse().unwrap());
            Ok(response)
        }
        .boxed()
    }
}

struct Journal {
    entries: Mutex<Vec<String>>,
}

impl BusMiddleware for Journal {
    fn handle<'a>(
        &'a self,
        message: Message,
        next: BusNext<'a>,
    ) -> BoxFuture<'a, Result<Reply, BusError>> {
        self.entries.lock().unwrap().push(message.name().to_string());
        next.run(message)
    }
}

struct Fixture {
    graph: Arc<ApplicationGraph>,
    journal: Arc<Journal>,
}

fn assemble() -> Fixture {
    let store = Store::default();
    let journal = Arc::new(Journal {
        entries: Mutex::new(vec![]),
    });

    let mut container = Container::default();
    container
        .register_instance::<dyn MessageHandler + Send + Sync>(
            "things.commands",
            Arc::new(ThingCommands {
                store: store.clone(),
            }),
        )
        .unwrap();
    container
        .register_instance::<dyn MessageHandler + Send + Sync>(
            "things.queries",
            Arc::new(ThingQueries { store }),
        )
        .unwrap();
    container
        .register_instance::<dyn Middleware + Send + Sync>("admin.stamp", Arc::new(Stamp))
        .unwrap();
    container
        .register_instance::<dyn BusMiddleware + Send + Sync>("journal", journal.clone())
        .unwrap();

    let mut config = AssemblyConfig::default();
    config.install_tracing_logger = false;

    let graph = ApplicationAssembler::new("app")
        .with_config(config)
        .route(RouteDeclaration::create(
            "things",
            "things.create",
            "/things",
            "CreateThing",
            "things.fetch",
        ))
        .route(RouteDeclaration::fetch(
            "things",
            "things.fetch",
            "/things/{id}",
            "FetchThing",
        ))
        .route(
            RouteDeclaration::execute("things", "things.remove", "/things/{id}", "RemoveThing")
                .methods(["DELETE"]),
        )
        .route(RouteDeclaration::execute_and_fetch(
            "things",
            "things.rename",
            "/things/{id}/name",
            "RenameThing",
            "FetchThing",
        ))
        .route(RouteDeclaration::fetch(
            "admin",
            "admin.things",
            "/admin/things/{id}",
            "FetchThing",
        ))
        .handler(HandlerDeclaration::command("things.commands", "CreateThing"))
        .handler(HandlerDeclaration::command("things.commands", "RemoveThing"))
        .handler(HandlerDeclaration::command("things.commands", "RenameThing"))
        .handler(HandlerDeclaration::query("things.queries", "FetchThing"))
        .middleware(MiddlewareDeclaration::new("admin.stamp").path("/admin"))
        .bus_middleware(BusMiddlewareDeclaration::new("journal"))
        .message::<CreateThing>("CreateThing")
        .message::<RemoveThing>("RemoveThing")
        .message::<RenameThing>("RenameThing")
        .message::<FetchThing>("FetchThing")
        .process(&mut container)
        .unwrap();

    Fixture { graph, journal }
}

fn request(method: Method, path: &str, body: Option<Value>) -> HttpRequest {
    let builder = Request::builder().method(method).uri(path);
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))
            .unwrap(),
        None => builder.body(Bytes::new()).unwrap(),
    }
}

fn body(response: &HttpResponse) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

fn assert_json(response: &HttpResponse, format: &str) {
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        format!("{format}; charset=UTF-8").as_str()
    );
    assert_eq!(response.headers()[X_CONTENT_TYPE_OPTIONS], "nosniff");
}

async fn create(graph: &ApplicationGraph, name: &str) -> HttpResponse {
    graph
        .handle(request(
            Method::POST,
            "/things",
            Some(json!({ "name": name })),
        ))
        .await
}

#[tokio::test]
async fn should_create_and_fetch_resource() {
    let fixture = assemble();

    let response = create(&fixture.graph, "John").await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_json(&response, "application/json");
    assert!(response.body().is_empty());

    let location = response.headers()[LOCATION].to_str().unwrap().to_string();
    let id = location.strip_prefix("/things/").unwrap();
    assert_eq!(Uuid::parse_str(id).unwrap().get_version_num(), 4);

    let response = fixture
        .graph
        .handle(request(Method::GET, &location, None))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_json(&response, "application/json");
    assert_eq!(body(&response), json!({"id": id, "name": "John"}));
}

#[tokio::test]
async fn should_remove_resource() {
    let fixture = assemble();

    let response = create(&fixture.graph, "John").await;
    let location = response.headers()[LOCATION].to_str().unwrap().to_string();

    let response = fixture
        .graph
        .handle(request(Method::DELETE, &location, None))
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_json(&response, "application/json");

    let response = fixture
        .graph
        .handle(request(Method::GET, &location, None))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_json(&response, "application/problem+json");
}

#[tokio::test]
async fn should_rename_and_return_resource() {
    let fixture = assemble();

    let response = create(&fixture.graph, "John").await;
    let location = response.headers()[LOCATION].to_str().unwrap().to_string();
    let id = location.strip_prefix("/things/").unwrap().to_string();

    let response = fixture
        .graph
        .handle(request(
            Method::PATCH,
            &format!("{location}/name"),
            Some(json!({ "name": "Jane" })),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_json(&response, "application/json");
    assert_eq!(body(&response), json!({"id": id, "name": "Jane"}));

    let response = fixture
        .graph
        .handle(request(Method::OPTIONS, &format!("{location}/name"), None))
        .await;
    assert_eq!(response.headers()[ALLOW], "PATCH, PUT");

    let response = fixture
        .graph
        .handle(request(Method::GET, &location, None))
        .await;
    assert_eq!(body(&response), json!({"id": id, "name": "Jane"}));
}

#[tokio::test]
async fn should_describe_missing_routes() {
    let fixture = assemble();

    let response = fixture
        .graph
        .handle(request(Method::GET, "/missing", None))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_json(&response, "application/problem+json");
    assert_eq!(
        body(&response),
        json!({
            "type": "https://httpstatuses.com/404",
            "title": "Not Found",
            "details": "Cannot GET /missing",
        })
    );
}

#[tokio::test]
async fn should_reject_unsupported_methods() {
    let fixture = assemble();

    let response = fixture
        .graph
        .handle(request(Method::PUT, "/things", Some(json!({}))))
        .await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "POST");
    assert_json(&response, "application/problem+json");
}

#[tokio::test]
async fn should_convert_handler_problems() {
    let fixture = assemble();

    let response = create(&fixture.graph, "Testing").await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_json(&response, "application/problem+json");
    assert_eq!(
        body(&response),
        json!({
            "type": "https://httpstatuses.com/422",
            "title": "Name not allowed",
            "details": "\"Testing\" is a forbidden name in this application",
        })
    );
}

#[tokio::test]
async fn should_reject_malformed_bodies() {
    let fixture = assemble();

    let mut malformed = request(Method::POST, "/things", None);
    *malformed.body_mut() = Bytes::from_static(b"{\"name\":");

    let response = fixture.graph.handle(malformed).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = fixture
        .graph
        .handle(request(Method::POST, "/things", Some(json!({}))))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn should_answer_head_and_options() {
    let fixture = assemble();

    let response = create(&fixture.graph, "John").await;
    let location = response.headers()[LOCATION].to_str().unwrap().to_string();

    let response = fixture
        .graph
        .handle(request(Method::HEAD, &location, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.body().is_empty());
    assert_json(&response, "application/json");

    let response = fixture
        .graph
        .handle(request(Method::OPTIONS, &location, None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[ALLOW], "GET, DELETE");
}

#[tokio::test]
async fn should_gate_middleware_by_path() {
    let fixture = assemble();

    let response = create(&fixture.graph, "John").await;
    let location = response.headers()[LOCATION].to_str().unwrap().to_string();
    assert!(response.headers().get("x-admin").is_none());

    let response = fixture
        .graph
        .handle(request(Method::GET, &format!("/admin{location}"), None))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-admin"], "true");
}

#[tokio::test]
async fn should_fall_back_to_default_format() {
    let fixture = assemble();

    let mut request = request(Method::GET, "/missing", None);
    request
        .headers_mut()
        .insert(ACCEPT, "text/html".parse().unwrap());

    let response = fixture.graph.handle(request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_json(&response, "application/problem+json");
}

#[tokio::test]
async fn should_pass_messages_through_bus_middleware() {
    let fixture = assemble();

    create(&fixture.graph, "John").await;

    let reply = fixture
        .graph
        .submit_query(Message::new(
            "FetchThing",
            FetchThing {
                id: "unknown".to_string(),
            },
        ))
        .await;
    assert!(matches!(reply, Err(BusError::Handler(_))));

    let reply = fixture
        .graph
        .submit_command(Message::new(
            "RemoveThing",
            RemoveThing {
                id: "unknown".to_string(),
            },
        ))
        .await
        .unwrap();
    assert!(reply.is_empty());

    assert_eq!(
        *fixture.journal.entries.lock().unwrap(),
        vec!["CreateThing", "FetchThing", "RemoveThing"]
    );
}
