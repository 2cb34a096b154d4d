//! End-to-end dispatch through the engine

use bindery_core::middleware::{self, issue_token, jwt};
use bindery_core::{
    Bind, Cors, Doc, Engine, EngineConfig, FileHandler, Location, Method, MsgType, Request,
    Response,
};
use parking_lot::Mutex;
use std::sync::Arc;

const SECRET: &[u8] = b"integration-secret";

#[derive(Debug, Default, Bind)]
struct Download {
    #[bind(r#"len:"6-6""#)]
    mp: String,
}

#[derive(Debug, Default, Bind)]
struct Login {
    #[bind(r#"required:"name is required""#)]
    name: String,
    #[bind(r#"required:"" len:"6-12""#)]
    password: String,
}

#[derive(Default, Bind)]
struct Upload {
    #[bind(r#"required:"title is required""#)]
    title: String,
    #[bind(r#"required:"no file" size-KB:"1-3" mime:"image""#)]
    avatar: FileHandler,
}

fn body(response: &Response) -> &str {
    std::str::from_utf8(&response.body).unwrap()
}

fn json(response: &Response) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap()
}

#[test]
fn test_literal_route_beats_template() {
    let mut engine = Engine::new();
    engine
        .handle(Method::Get, "/users/{id}", Doc::new("show"), |ctx| {
            let id = ctx.path_values().get("id").to_string();
            ctx.text(format!("user {id}"));
        })
        .unwrap();
    engine
        .handle(Method::Get, "/users/me", Doc::new("me"), |ctx| ctx.text("me"))
        .unwrap();

    assert_eq!(body(&engine.dispatch(Request::new(Method::Get, "/users/me"))), "me");
    assert_eq!(body(&engine.dispatch(Request::new(Method::Get, "/users/7"))), "user 7");
    assert_eq!(engine.dispatch(Request::new(Method::Post, "/users/7")).status, 404);
}

#[test]
fn test_placeholder_with_suffix() {
    let mut engine = Engine::new();
    engine
        .handle(
            Method::Get,
            "/{mp}.txt",
            Doc::new("verify file").param::<Download>(Location::Path),
            |ctx| {
                let mut d = Download::default();
                match ctx.bind(&mut d) {
                    Ok(()) => ctx.text(d.mp),
                    Err(e) => ctx.fail(e),
                }
            },
        )
        .unwrap();

    let response = engine.dispatch(Request::new(Method::Get, "/123456.txt"));
    assert_eq!(response.status, 200);
    assert_eq!(body(&response), "123456");
    assert_eq!(engine.dispatch(Request::new(Method::Get, "/123456.png")).status, 404);
    assert_eq!(engine.dispatch(Request::new(Method::Get, "/1234.txt")).status, 400);
}

#[test]
fn test_form_login_failure_message() {
    let mut engine = Engine::new();
    engine
        .handle(
            Method::Post,
            "/login",
            Doc::new("login").param::<Login>(Location::Form),
            |ctx| {
                let mut login = Login::default();
                if let Err(e) = ctx.bind(&mut login) {
                    ctx.fail(e);
                    return;
                }
                ctx.status_json(0, &login.name);
            },
        )
        .unwrap();

    let request = Request::new(Method::Post, "/login")
        .with_header("content-type", "application/x-www-form-urlencoded")
        .with_body("name=ann&password=abc");
    let response = engine.dispatch(request);
    assert_eq!(response.status, 400);
    assert_eq!(
        json(&response),
        serde_json::json!({"type": "warning", "content": "string length 6-12"})
    );

    let request = Request::new(Method::Post, "/login?password=secret-pw")
        .with_header("content-type", "application/x-www-form-urlencoded")
        .with_body("name=ann");
    let response = engine.dispatch(request);
    assert_eq!(response.status, 200);
    assert_eq!(json(&response), serde_json::json!({"code": 0, "data": "ann"}));
}

#[test]
fn test_multipart_upload_reaches_file_handler() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&saved);
    let mut engine = Engine::new();
    engine
        .handle(
            Method::Post,
            "/avatar",
            Doc::new("upload avatar").param::<Upload>(Location::Form),
            move |ctx| {
                let sink = Arc::clone(&sink);
                let mut upload = Upload {
                    avatar: FileHandler::new(move |_, file| {
                        sink.lock().push(file.filename.clone());
                        Ok(())
                    }),
                    ..Upload::default()
                };
                match ctx.bind(&mut upload) {
                    Ok(()) => ctx.message(MsgType::Success, upload.title),
                    Err(e) => ctx.fail(e),
                }
            },
        )
        .unwrap();

    let image = "x".repeat(2048);
    let payload = format!(
        "--B\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nme\r\n\
         --B\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
         Content-Type: image/png\r\n\r\n{image}\r\n--B--\r\n"
    );
    let request = Request::new(Method::Post, "/avatar")
        .with_header("content-type", "multipart/form-data; boundary=B")
        .with_body(payload);
    let response = engine.dispatch(request);
    assert_eq!(response.status, 200);
    assert_eq!(json(&response)["content"], "me");
    assert_eq!(*saved.lock(), ["me.png"]);

    let request = Request::new(Method::Post, "/avatar")
        .with_header("content-type", "multipart/form-data; boundary=B")
        .with_body("--B\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nme\r\n--B--\r\n");
    let response = engine.dispatch(request);
    assert_eq!(response.status, 400);
    assert_eq!(json(&response)["content"], "no file");
}

#[test]
fn test_multipart_text_must_be_utf8() {
    let mut engine = Engine::new();
    engine
        .handle(
            Method::Post,
            "/avatar",
            Doc::new("upload avatar").param::<Upload>(Location::Form),
            |ctx| {
                let mut upload = Upload::default();
                match ctx.bind(&mut upload) {
                    Ok(()) => ctx.text(upload.title),
                    Err(e) => ctx.fail(e),
                }
            },
        )
        .unwrap();

    let mut payload = b"--B\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n".to_vec();
    payload.extend_from_slice(&[0xc3, 0x28]);
    payload.extend_from_slice(b"\r\n--B--\r\n");
    let request = Request::new(Method::Post, "/avatar")
        .with_header("content-type", "multipart/form-data; boundary=B")
        .with_body(payload);
    let response = engine.dispatch(request);
    assert_eq!(response.status, 400);
    assert_eq!(json(&response)["type"], "warning");
    assert!(json(&response)["content"]
        .as_str()
        .unwrap()
        .starts_with("title: cannot parse"));
}

#[test]
fn test_upload_param_rejected_outside_form() {
    let mut engine = Engine::new();
    let err = engine
        .handle(
            Method::Get,
            "/avatar",
            Doc::new("bad").param::<Upload>(Location::Form),
            |_| {},
        )
        .unwrap_err();
    assert!(err.to_string().contains("is illegal"));
    assert!(engine.api_doc().is_empty());
}

#[test]
fn test_jwt_group_flow() {
    let mut engine = Engine::new();
    engine
        .group()
        .with(Cors::new())
        .with(jwt(SECRET))
        .handle(Method::Get, "/me", Doc::new("profile"), |ctx| {
            let id = middleware::user_id(ctx).unwrap_or_default();
            ctx.status_json(0, id);
        })
        .unwrap();

    let response = engine.dispatch(Request::new(Method::Get, "/me"));
    assert_eq!(response.status, 401);
    assert_eq!(json(&response)["type"], "warning");
    assert_eq!(response.header("Access-Control-Allow-Origin"), Some("*"));

    let token = issue_token(SECRET, 42, chrono::Duration::hours(1)).unwrap();
    let response =
        engine.dispatch(Request::new(Method::Get, "/me").with_header("authorization", &token));
    assert_eq!(response.status, 200);
    assert_eq!(json(&response), serde_json::json!({"code": 0, "data": 42}));

    let expired = issue_token(SECRET, 42, chrono::Duration::hours(-2)).unwrap();
    let response =
        engine.dispatch(Request::new(Method::Get, "/me").with_header("authorization", &expired));
    assert_eq!(response.status, 401);
    assert_eq!(json(&response)["content"], "authorization expired");

    let forged = issue_token(b"other", 42, chrono::Duration::hours(1)).unwrap();
    let response =
        engine.dispatch(Request::new(Method::Get, "/me").with_header("authorization", &forged));
    assert_eq!(response.status, 401);
}

#[test]
fn test_api_doc_lists_middleware_and_params() {
    let mut engine = Engine::new();
    let mut admin = engine.group().with(jwt(SECRET));
    admin
        .handle(
            Method::Post,
            "/login",
            Doc::new("login").desc("sign in").param::<Login>(Location::Form),
            |_| {},
        )
        .unwrap();
    admin
        .group()
        .with(middleware::logging())
        .handle(
            Method::Post,
            "/avatar",
            Doc::new("avatar").param::<Upload>(Location::Form),
            |_| {},
        )
        .unwrap();

    let doc = serde_json::to_value(engine.api_doc()).unwrap();
    assert_eq!(doc[0]["method"], "POST");
    assert_eq!(doc[0]["route"], "/login");
    assert_eq!(doc[0]["desc"], "sign in");
    assert_eq!(doc[0]["middleware"], serde_json::json!(["JWT Authentication"]));
    assert_eq!(doc[0]["params"][0]["location"], "form");
    assert_eq!(doc[0]["params"][0]["fields"][1]["name"], "password");
    assert_eq!(doc[1]["content_type"], "multipart/form-data");
    assert_eq!(doc[1]["middleware"].as_array().unwrap().len(), 2);
}

#[test]
fn test_contexts_are_reused() {
    let mut engine = Engine::with_config(
        EngineConfig::default()
            .with_pool_size(1)
            .with_request_logging(false),
    );
    engine
        .handle(Method::Get, "/count", Doc::new("count"), |ctx| {
            assert!(ctx.get::<u32>("seen").is_none());
            ctx.set("seen", 1u32);
            ctx.text("ok");
        })
        .unwrap();
    for _ in 0..3 {
        assert_eq!(engine.dispatch(Request::new(Method::Get, "/count")).status, 200);
    }
    assert_eq!(engine.idle_contexts(), 1);
}

#[test]
fn test_action_without_response_is_empty_200() {
    let mut engine = Engine::new();
    engine
        .handle(Method::Delete, "/items/{id}", Doc::new("delete"), |_| {})
        .unwrap();
    let response = engine.dispatch(Request::new(Method::Delete, "/items/3"));
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}
