//! Minimal arbor example: a public and a protected API group, built-in
//! service endpoints and an OpenAPI document.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/status
//!   curl -H 'Indent: true' http://localhost:3000/api/users
//!   curl -X POST http://localhost:3000/api/protected/users \
//!        -H 'authorization: Bearer demo' -d '{"name":"alice"}'
//!   curl -i -X OPTIONS http://localhost:3000/api/protected/users
//!   curl http://localhost:3000/openapi.json

use arbor::envelope::{self, Failure, Reply};
use arbor::openapi::{Operation, Parameter, Tag};
use arbor::{
    Config, DocConfig, Method, Request, Response, RootRouter, StatusCode, describe, introspect,
    middleware,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), arbor::Error> {
    tracing_subscriber::fmt::init();

    let root = RootRouter::new(
        Config::new("/")
            .generic_to_http(envelope::to_http)
            .stats(middleware::trace::stats()),
        DocConfig::new("directory", "Users and their domains", "0.1.0").tag(Tag::new("users")),
    )?;
    root.endpoint("/status", Method::GET, introspect::status(), None)?;
    root.endpoint("/routes", Method::GET, introspect::routes(root.registry()), None)?;
    root.handle("/openapi.json", introspect::openapi(root.registry()))?;

    let api = root.subrouter(Config::new("/api").default_parameter(Parameter::header("Indent")));
    api.endpoint(
        "/users",
        Method::GET,
        envelope::handler(list_users),
        describe(|| {
            Ok(Operation::new()
                .tag("users")
                .summary("List users")
                .parameter(Parameter::query("limit"))
                .response(200, "the users"))
        }),
    )?;

    let protected = api.subrouter(
        Config::new("/protected")
            .middleware(require_bearer())
            .allow_header("X-Tenant"),
    );
    protected.endpoint(
        "/users",
        Method::POST,
        envelope::handler(create_user),
        describe(|| Ok(Operation::new().tag("users").summary("Create a user").response(200, "created"))),
    )?;

    root.build(":3000", None)?.serve().await
}

// Rejects requests without a bearer token before they reach the handler.
fn require_bearer() -> middleware::Middleware {
    middleware::around(|req, next| async move {
        match req.header("authorization") {
            Some(value) if value.starts_with("Bearer ") => next.call(req).await,
            _ => Response::status(StatusCode::UNAUTHORIZED),
        }
    })
}

// GET /api/users?limit=N
async fn list_users(req: Request) -> Result<Reply, Failure> {
    let limit = req
        .query_pairs()
        .into_iter()
        .find(|(k, _)| k == "limit")
        .map(|(_, v)| v.parse::<usize>())
        .transpose()
        .map_err(|_| Failure::bad_request("limit must be a number"))?
        .unwrap_or(10);

    let users: Vec<_> = ["alice", "bob", "carol"].into_iter().take(limit).collect();
    Ok(Reply::ok(json!(users)).with_meta(json!({"limit": limit})))
}

// POST /api/protected/users
async fn create_user(req: Request) -> Result<Reply, Failure> {
    let body: serde_json::Value =
        serde_json::from_slice(req.body()).map_err(|e| Failure::bad_request(e.to_string()))?;
    let Some(name) = body.get("name").and_then(|n| n.as_str()) else {
        return Err(Failure::bad_request("name required"));
    };
    Ok(Reply::ok(json!({"id": 99, "name": name})).with_status(StatusCode::CREATED))
}
