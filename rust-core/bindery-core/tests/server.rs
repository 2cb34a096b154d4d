//! Server harness without the network stack

use bindery_core::{Bind, Doc, Engine, Location, Method, Server, ServerConfig};
use hyper::body::Bytes;

#[derive(Debug, Default, Bind)]
struct Token {
    #[bind(r#"param:"X-Api-Key" required:"missing key""#)]
    key: String,
}

fn server() -> Server {
    let mut engine = Engine::new();
    engine
        .handle(
            Method::Get,
            "/key",
            Doc::new("echo key").param::<Token>(Location::Header),
            |ctx| {
                let mut token = Token::default();
                match ctx.bind(&mut token) {
                    Ok(()) => ctx.text(token.key),
                    Err(e) => ctx.fail(e),
                }
            },
        )
        .unwrap();
    engine
        .handle(Method::Get, "/boom", Doc::new("boom"), |_| panic!("boom"))
        .unwrap();
    Server::with_config(engine, ServerConfig::default().with_max_body_size(16))
}

#[tokio::test]
async fn test_header_binding() {
    let server = server();
    let response = server
        .test_request(Method::Get, "/key", &[("x-api-key", "k-1")], None)
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"k-1");

    let response = server.test_request(Method::Get, "/key", &[], None).await;
    assert_eq!(response.status, 400);
    let message: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(message["content"], "missing key");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = server();
    let response = server.test_request(Method::Get, "/nowhere", &[], None).await;
    assert_eq!(response.status, 404);
    assert!(!response.header("x-request-id").unwrap_or("").is_empty());

    let response = server
        .test_request(Method::Get, "/boom", &[("X-Request-Id", "abc")], None)
        .await;
    assert_eq!(response.status, 500);
    assert_eq!(response.header("x-request-id"), Some("abc"));
    assert_eq!(server.engine().idle_contexts(), 1);
}

#[tokio::test]
async fn test_body_limit() {
    let server = server();
    let response = server
        .test_request(
            Method::Get,
            "/key",
            &[("x-api-key", "k")],
            Some(Bytes::from(vec![b'a'; 17])),
        )
        .await;
    assert_eq!(response.status, 413);
}
