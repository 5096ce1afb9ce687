use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arbor::envelope::{self, EnvelopeHandler, Reply};
use arbor::middleware::{self, Middleware, RequestFields};
use arbor::openapi::Operation;
use arbor::{
    BoxedHandler, Config, DocConfig, Method, Request, Response, RootRouter, Router, Server,
    ServerConfig, StatusCode, describe,
};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Value, json};

type Log = Arc<Mutex<Vec<String>>>;

fn root(prefix: &str) -> RootRouter<EnvelopeHandler> {
    RootRouter::new(
        Config::new(prefix).generic_to_http(envelope::to_http),
        DocConfig::new("svc", "integration tests", "0.0.1"),
    )
    .unwrap()
}

fn request(method: Method, uri: &str) -> Request {
    http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap().into()
}

fn body(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

fn ok() -> EnvelopeHandler {
    envelope::handler(|_req| async { Ok(Reply::default()) })
}

fn logging_handler(log: &Log, name: &str) -> EnvelopeHandler {
    let log = Arc::clone(log);
    let name = name.to_owned();
    envelope::handler(move |_req| {
        log.lock().push(name.clone());
        async { Ok(Reply::default()) }
    })
}

fn logging_middleware(log: &Log, name: &str) -> Middleware {
    let log = Arc::clone(log);
    let name = name.to_owned();
    middleware::around(move |req, next| {
        log.lock().push(name.clone());
        async move { next.call(req).await }
    })
}

fn logging_generic(log: &Log, name: &str) -> impl Fn(EnvelopeHandler) -> EnvelopeHandler + Send + Sync + 'static {
    let log = Arc::clone(log);
    let name = name.to_owned();
    envelope::around(move |req, next| {
        log.lock().push(name.clone());
        next(req)
    })
}

#[tokio::test]
async fn middleware_runs_outermost_first_across_levels() {
    let log: Log = Default::default();
    let root = RootRouter::new(
        Config::new("/")
            .generic_to_http(envelope::to_http)
            .middleware(logging_middleware(&log, "A"))
            .generic_middleware(logging_generic(&log, "gA")),
        DocConfig::new("svc", "d", "v"),
    )
    .unwrap();
    let b = root.subrouter(
        Config::new("/b")
            .middleware(logging_middleware(&log, "B"))
            .generic_middleware(logging_generic(&log, "gB")),
    );
    let c = b.subrouter(Config::new("/c").middleware(logging_middleware(&log, "C")));
    c.endpoint("/x", Method::GET, logging_handler(&log, "handler"), None).unwrap();

    let server = root.build(":0", None).unwrap();
    let res = server.handle(request(Method::GET, "/b/c/x")).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(*log.lock(), vec!["A", "B", "C", "gA", "gB", "handler"]);
}

#[tokio::test]
async fn siblings_are_isolated_and_grandchildren_inherit() {
    let log: Log = Default::default();
    let root = root("/");
    let sub1 = root.subrouter(Config::new("/sub1").middleware(logging_middleware(&log, "auth")));
    let sub2 = root.subrouter(Config::new("/sub2"));
    let grandchild = sub1.subrouter(Config::new("/deep"));

    sub2.endpoint("/open", Method::GET, ok(), None).unwrap();
    grandchild.endpoint("/closed", Method::GET, ok(), None).unwrap();
    let server = root.build(":0", None).unwrap();

    server.handle(request(Method::GET, "/sub2/open")).await;
    assert!(log.lock().is_empty());

    server.handle(request(Method::GET, "/sub1/deep/closed")).await;
    assert_eq!(*log.lock(), vec!["auth"]);
}

#[tokio::test]
async fn options_synthesized_from_registered_methods() {
    let root = root("/root");
    let sub1 = root.subrouter(Config::new("/sub1"));
    let sub2 = sub1.subrouter(Config::new("/sub2").allow_header("X-Test-Header"));
    sub2.endpoint("/endpoint", Method::GET, ok(), None).unwrap();
    sub2.endpoint("/endpoint", Method::POST, ok(), None).unwrap();
    sub1.subrouter(Config::new("/other")).endpoint("/plain", Method::PUT, ok(), None).unwrap();
    let grandchild = sub2.subrouter(Config::new("/g1")).subrouter(Config::new("/g2"));
    grandchild.endpoint("/leaf", Method::DELETE, ok(), None).unwrap();
    let server = root.build(":0", None).unwrap();

    let res = server.handle(request(Method::OPTIONS, "/root/sub1/sub2/endpoint")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.body().is_empty());
    assert_eq!(res.header("allow"), Some("GET,OPTIONS,POST"));
    assert_eq!(res.header("access-control-allow-methods"), Some("GET,OPTIONS,POST"));
    assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    assert_eq!(res.header("access-control-max-age"), Some("600"));
    let allowed = res.header("access-control-allow-headers").unwrap();
    assert!(allowed.starts_with("Content-Type,Cache-Control,Authorization"));
    assert!(allowed.ends_with(",X-Test-Header"));

    let res = server.handle(request(Method::OPTIONS, "/root/sub1/sub2/g1/g2/leaf")).await;
    assert_eq!(res.header("allow"), Some("DELETE,OPTIONS"));
    assert!(res.header("access-control-allow-headers").unwrap().ends_with(",X-Test-Header"));

    let res = server.handle(request(Method::OPTIONS, "/root/sub1/other/plain")).await;
    assert_eq!(res.header("allow"), Some("OPTIONS,PUT"));
    assert!(!res.header("access-control-allow-headers").unwrap().contains("X-Test-Header"));
}

#[tokio::test]
async fn endpoint_with_trailing_slash_is_not_a_mount() {
    let root = root("/");
    let api = root.subrouter(Config::new("/api"));
    api.endpoint("/users/", Method::GET, ok(), None).unwrap();
    let server = root.build(":0", None).unwrap();

    assert_eq!(server.handle(request(Method::GET, "/api/users")).await.status_code(), StatusCode::OK);
    assert_eq!(
        server.handle(request(Method::DELETE, "/api/users")).await.status_code(),
        StatusCode::METHOD_NOT_ALLOWED
    );
    for (method, uri) in [
        (Method::GET, "/api/users/42/secret"),
        (Method::DELETE, "/api/users/x"),
        (Method::OPTIONS, "/api/users/anything"),
    ] {
        let res = server.handle(request(method, uri)).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn unknown_method_gets_405_and_unknown_path_404() {
    let root = root("/");
    root.endpoint("/items", Method::GET, ok(), None).unwrap();
    let server = root.build(":0", None).unwrap();

    let res = server.handle(request(Method::DELETE, "/items")).await;
    assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.header("allow"), Some("GET,OPTIONS"));

    let res = server.handle(request(Method::GET, "/nothing")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn exact_method_beats_mount_and_longest_mount_wins() {
    let root = root("/");
    root.handle("/files", |req: Request| async move { format!("any {}", req.method()) }).unwrap();
    root.endpoint("/files", Method::GET, ok(), None).unwrap();
    root.handle("/static/", |_req: Request| async { "static" }).unwrap();
    root.handle("/static/img/", |_req: Request| async { "images" }).unwrap();
    let server = root.build(":0", None).unwrap();

    let res = server.handle(request(Method::GET, "/files")).await;
    assert_eq!(body(&res), json!({"success": true}));
    let res = server.handle(request(Method::DELETE, "/files")).await;
    assert_eq!(res.body(), b"any DELETE");

    let res = server.handle(request(Method::GET, "/static/css/site.css")).await;
    assert_eq!(res.body(), b"static");
    let res = server.handle(request(Method::GET, "/static/img/logo.png")).await;
    assert_eq!(res.body(), b"images");
    let res = server.handle(request(Method::GET, "/statics")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn built_in_middleware_trims_and_records_fields() {
    let root = root("/");
    let echo = envelope::handler(|req: Request| async move {
        let recorded = req.extensions().get::<RequestFields>().cloned().unwrap_or_default();
        Ok(Reply::ok(json!({
            "query": req.query_pairs(),
            "header": req.header("x-name"),
            "recorded": recorded.parameters,
        })))
    });
    root.endpoint("/echo", Method::GET, echo, None).unwrap();
    let server = root.build(":0", None).unwrap();

    let req: Request = http::Request::builder()
        .uri("/echo?name=%20bob%20")
        .header("x-name", "  alice ")
        .body(Bytes::new())
        .unwrap()
        .into();
    let res = server.handle(req).await;

    let value = body(&res);
    let data = &value["data"];
    assert_eq!(data["query"], json!([["name", "bob"]]));
    assert_eq!(data["header"], "alice");
    assert_eq!(data["recorded"], json!({"name": ["bob"]}));
}

#[test]
fn stats_hook_wraps_with_method_and_full_path() {
    let seen: Arc<Mutex<Vec<String>>> = Default::default();
    let hook = {
        let seen = Arc::clone(&seen);
        middleware::stats_hook(move |next: BoxedHandler, method, path| {
            seen.lock().push(format!("{method} {path}"));
            next
        })
    };
    let root = root("/");
    let api = root.subrouter(Config::new("/api").stats(hook));
    api.endpoint("/a", Method::GET, ok(), None).unwrap();
    api.subrouter(Config::new("/v2")).endpoint("/b", Method::POST, ok(), None).unwrap();
    root.endpoint("/c", Method::GET, ok(), None).unwrap();

    assert_eq!(*seen.lock(), vec!["GET /api/a", "POST /api/v2/b"]);
}

#[tokio::test]
async fn subrouter_conversion_overrides_parent() {
    let root = root("/");
    let plain = root.subrouter(Config::new("/plain").generic_to_http(|_h: EnvelopeHandler| {
        arbor::boxed(|_req: Request| async { "converted elsewhere" })
    }));
    plain.endpoint("/x", Method::GET, ok(), None).unwrap();
    plain.subrouter(Config::new("/nested")).endpoint("/y", Method::GET, ok(), None).unwrap();
    root.endpoint("/z", Method::GET, ok(), None).unwrap();
    let server = root.build(":0", None).unwrap();

    assert_eq!(server.handle(request(Method::GET, "/plain/x")).await.body(), b"converted elsewhere");
    assert_eq!(server.handle(request(Method::GET, "/plain/nested/y")).await.body(), b"converted elsewhere");
    assert_eq!(server.handle(request(Method::GET, "/z")).await.body(), br#"{"success":true}"#);
}

#[test]
fn documentation_merges_per_path_and_method() {
    let root = root("/");
    let api = root.subrouter(Config::new("/api"));
    api.endpoint("/users", Method::GET, ok(), describe(|| Ok(Operation::new().summary("list")))).unwrap();
    api.endpoint("/users", Method::POST, ok(), describe(|| Ok(Operation::new().summary("create")))).unwrap();
    api.endpoint("/users", Method::HEAD, ok(), describe(|| Ok(Operation::new()))).unwrap();

    let doc = serde_json::to_value(root.openapi()).unwrap();
    assert_eq!(doc["openapi"], "3.0.3");
    assert_eq!(doc["info"], json!({"title": "svc", "description": "integration tests", "version": "0.0.1"}));
    assert_eq!(doc["paths"]["/api/users"]["get"]["summary"], "list");
    assert_eq!(doc["paths"]["/api/users"]["post"]["summary"], "create");
    assert_eq!(root.list_routes()["/api/users"], vec!["GET", "HEAD", "POST"]);
}

#[test]
fn concurrent_registration_from_many_threads() {
    const N: usize = 32;
    let root = root("/");
    let api: Router<EnvelopeHandler> = root.subrouter(Config::new("/api"));

    thread::scope(|s| {
        for i in 0..N {
            let api = &api;
            s.spawn(move || {
                let method = if i % 2 == 0 { Method::GET } else { Method::POST };
                api.endpoint(&format!("/r{}", i / 2), method, ok(), describe(|| Ok(Operation::new())))
                    .unwrap();
            });
        }
    });

    let routes = root.list_routes();
    assert_eq!(routes.len(), N / 2);
    assert!(routes.values().all(|methods| methods == &vec!["GET", "POST"]));
    assert_eq!(root.openapi().paths.len(), N / 2);
}

#[tokio::test]
async fn slow_handler_hits_write_timeout() {
    let root = root("/");
    let slow = envelope::handler(|_req| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Reply::default())
    });
    root.endpoint("/slow", Method::GET, slow, None).unwrap();
    let config = ServerConfig { write_timeout: Duration::from_millis(50), ..Default::default() };
    let server = root.build(":0", Some(config)).unwrap();

    let res = server.handle(request(Method::GET, "/slow")).await;
    assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn defaults_replace_zero_timeouts() {
    let root = root("/");
    let zero = ServerConfig {
        read_timeout: Duration::ZERO,
        write_timeout: Duration::ZERO,
        idle_timeout: Duration::ZERO,
    };
    let server: Server = root.build(":8080", Some(zero)).unwrap();

    assert_eq!(server.addr().port(), 8080);
    assert_eq!(*server.config(), ServerConfig::default());
    assert_eq!(server.config().read_timeout, Duration::from_secs(5));
    assert_eq!(server.config().write_timeout, Duration::from_secs(90));
    assert_eq!(server.config().idle_timeout, Duration::from_secs(600));
}

mod e2e {
    use http_body_util::{BodyExt, Full};
    use hyper_util::rt::TokioIo;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    use super::*;

    async fn send(addr: std::net::SocketAddr, req: http::Request<Full<Bytes>>) -> (http::response::Parts, Bytes) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await.unwrap();
        tokio::spawn(conn);

        let res = sender.send_request(req).await.unwrap();
        let (parts, body) = res.into_parts();
        (parts, body.collect().await.unwrap().to_bytes())
    }

    #[tokio::test]
    async fn serves_over_tcp_and_shuts_down() {
        let root = root("/");
        let api = root.subrouter(Config::new("/api").allow_header("X-Tenant"));
        api.endpoint(
            "/echo",
            Method::POST,
            envelope::handler(|req: Request| async move {
                match serde_json::from_slice::<Value>(req.body()) {
                    Ok(input) => Ok(Reply::ok(input)),
                    Err(e) => Err(envelope::Failure::bad_request(e.to_string())),
                }
            }),
            None,
        )
        .unwrap();

        let server = root.build("127.0.0.1:0", None).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(server.serve_with_shutdown(listener, async {
            let _ = stop_rx.await;
        }));

        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .header("host", addr.to_string())
            .header("indent", "true")
            .body(Full::new(Bytes::from_static(br#"{"name":"alice"}"#)))
            .unwrap();
        let (parts, bytes) = send(addr, req).await;
        assert_eq!(parts.status, StatusCode::OK);
        let text = std::str::from_utf8(&bytes).unwrap();
        assert!(text.contains("\n\t\"success\": true"));
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["data"], json!({"name": "alice"}));

        let req = http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/echo")
            .header("host", addr.to_string())
            .header("origin", "https://app.example")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let (parts, _) = send(addr, req).await;
        assert_eq!(parts.status, StatusCode::OK);
        assert_eq!(parts.headers["allow"], "OPTIONS,POST");
        assert_eq!(parts.headers["access-control-allow-origin"], "https://app.example");
        assert!(parts.headers["access-control-allow-headers"].to_str().unwrap().ends_with("X-Tenant"));

        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .header("host", addr.to_string())
            .body(Full::new(Bytes::from_static(b"not json")))
            .unwrap();
        let (parts, bytes) = send(addr, req).await;
        assert_eq!(parts.status, StatusCode::BAD_REQUEST);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["success"], false);

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap().unwrap();
    }

    async fn start(config: ServerConfig) -> (std::net::SocketAddr, oneshot::Sender<()>) {
        let root = root("/");
        root.endpoint("/ping", Method::GET, ok(), None).unwrap();
        let server = root.build("127.0.0.1:0", Some(config)).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve_with_shutdown(listener, async {
            let _ = stop_rx.await;
        }));
        (addr, stop_tx)
    }

    #[tokio::test]
    async fn idle_keep_alive_connection_is_closed() {
        let idle = Duration::from_millis(300);
        let (addr, _stop) = start(ServerConfig { idle_timeout: idle, ..Default::default() }).await;

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await.unwrap();
        let conn = tokio::spawn(conn);

        let req = http::Request::builder()
            .uri("/ping")
            .header("host", addr.to_string())
            .body(Full::new(Bytes::new()))
            .unwrap();
        let res = sender.send_request(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        res.into_body().collect().await.unwrap();

        // Kept alive after the response, then closed by the server once idle.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!conn.is_finished());
        let closed = tokio::time::timeout(idle * 10, conn).await;
        assert!(closed.is_ok(), "connection still open after the idle timeout");
        drop(sender);
    }

    #[tokio::test]
    async fn slow_request_headers_hit_read_timeout() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let config = ServerConfig { read_timeout: Duration::from_millis(100), ..Default::default() };
        let (addr, _stop) = start(config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET /ping HTTP/1.1\r\nhost: x\r\n").await.unwrap();

        let mut rest = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(3), stream.read_to_end(&mut rest)).await;
        assert!(read.is_ok(), "server kept waiting for headers past the read timeout");
        assert!(!String::from_utf8_lossy(&rest).contains("200 OK"));
    }
}
