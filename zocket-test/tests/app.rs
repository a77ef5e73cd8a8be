//! End-to-end coverage of the scenarios in spec.md §8, driven through
//! [`zocket_test::TestHarness`] against a real `ZocketCore` — no mock of
//! the dispatch engine, just a fake transport sink.

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zocket_core::core::ZocketCore;
use zocket_core::middleware::MiddlewareError;
use zocket_core::router::{ProcedureBuilder, Router};
use zocket_core::schema::TypedValidator;
use zocket_core::transport::HandshakeRequest;
use zocket_test::TestHarness;

#[derive(Debug, Deserialize, Serialize, Validate)]
struct PingInput {
    #[garde(length(min = 1, max = 256))]
    message: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
struct SayInput {
    #[garde(length(min = 1))]
    room: String,
    #[garde(length(min = 1, max = 512))]
    text: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
struct Headers {
    #[garde(length(min = 1))]
    token: String,
}

fn build_router() -> Router {
    Router::builder()
        .route(
            "echo.ping",
            ProcedureBuilder::incoming().schema(TypedValidator::<PingInput>::new()).handler(
                |ctx, payload: Value| async move {
                    let input: PingInput = serde_json::from_value(payload).unwrap();
                    let reply = format!("pong: {}", input.message);
                    ctx.send().to([ctx.client_id().to_string()]).emit("echo.onPong", json!({ "reply": reply })).await;
                    Ok(Some(Value::String(reply)))
                },
            ),
        )
        .out("echo.onPong")
        .route(
            "rooms.say",
            ProcedureBuilder::incoming().schema(TypedValidator::<SayInput>::new()).handler(
                |ctx, payload: Value| async move {
                    let input: SayInput = serde_json::from_value(payload).unwrap();
                    ctx.send().to_room([input.room.clone()]).emit("rooms.onSay", json!({ "text": input.text })).await;
                    Ok(None)
                },
            ),
        )
        .out("rooms.onSay")
        .route(
            "admin.do",
            ProcedureBuilder::incoming()
                .middleware(|ctx: zocket_core::context::RequestContext, _payload: Value| async move {
                    match ctx.get("role") {
                        Some(Value::String(role)) if role == "admin" => Ok(()),
                        _ => Err(MiddlewareError("not an admin".to_string())),
                    }
                })
                .handler(|_ctx, _payload| async move { Ok(Some(json!("done"))) }),
        )
        .build()
        .expect("router builds")
}

fn build_core() -> ZocketCore {
    ZocketCore::builder(build_router())
        .handshake_schema(TypedValidator::<Headers>::new())
        .on_connect(|ctx: zocket_core::context::ConnectionContext| async move {
            if let Some(role) = ctx.handshake().header("x-role") {
                ctx.set("role", Value::String(role.to_string()));
            }
            Ok(())
        })
        .build()
}

fn handshake(token: &str, role: Option<&str>) -> HandshakeRequest {
    let mut headers = vec![("token".to_string(), token.to_string())];
    if let Some(role) = role {
        headers.push(("x-role".to_string(), role.to_string()));
    }
    HandshakeRequest { headers, query: String::new() }
}

#[tokio::test]
async fn fire_and_forget_event() {
    let harness = TestHarness::new(build_core());
    let client = harness.connect(handshake("t1", None)).await.unwrap();

    client.send("echo.ping", json!({ "message": "hi" }));

    let payload = client.recv_event("echo.onPong").await.expect("onPong frame");
    assert_eq!(payload, json!({ "reply": "pong: hi" }));
}

#[tokio::test]
async fn rpc_round_trip() {
    let harness = TestHarness::new(build_core());
    let client = harness.connect(handshake("t1", None)).await.unwrap();

    let reply = client.call("echo.ping", json!({ "message": "hi" }), "r1").await;
    assert_eq!(reply, Some(json!("pong: hi")));
}

#[tokio::test]
async fn room_fan_out_reaches_only_members() {
    let harness = TestHarness::new(build_core());
    let a = harness.connect(handshake("t1", None)).await.unwrap();
    let b = harness.connect(handshake("t1", None)).await.unwrap();
    let c = harness.connect(handshake("t1", None)).await.unwrap();

    harness.core().rooms().join("general", a.client_id());
    harness.core().rooms().join("general", b.client_id());

    a.send("rooms.say", json!({ "room": "general", "text": "hello" }));

    assert_eq!(a.recv_event("rooms.onSay").await, Some(json!({ "text": "hello" })));
    assert_eq!(b.recv_event("rooms.onSay").await, Some(json!({ "text": "hello" })));
    c.assert_silent(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn middleware_rejection_is_silent() {
    let harness = TestHarness::new(build_core());
    let client = harness.connect(handshake("t1", Some("user"))).await.unwrap();

    client.send_raw(json!({ "type": "admin.do", "payload": {}, "rpcId": "r2" }).to_string());

    client.assert_silent(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn middleware_accepts_admin_role() {
    let harness = TestHarness::new(build_core());
    let client = harness.connect(handshake("t1", Some("admin"))).await.unwrap();

    let reply = client.call("admin.do", json!({}), "r3").await;
    assert_eq!(reply, Some(json!("done")));
}

#[tokio::test]
async fn handshake_rejection_returns_details() {
    let harness = TestHarness::new(build_core());
    let result = harness.connect(HandshakeRequest::default()).await;

    match result {
        Err(zocket_core::error::Rejection::HandshakeInvalid { issues }) => {
            assert!(!issues.is_empty());
        }
        other => panic!("expected a handshake rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_cleanup_removes_from_every_room() {
    let harness = TestHarness::new(build_core());
    let a = harness.connect(handshake("t1", None)).await.unwrap();
    let b = harness.connect(handshake("t1", None)).await.unwrap();

    harness.core().rooms().join("r1", a.client_id());
    harness.core().rooms().join("r2", a.client_id());

    a.close().await;

    b.send("rooms.say", json!({ "room": "r1", "text": "after disconnect" }));
    b.assert_silent(Duration::from_millis(200)).await;
    assert!(harness.core().rooms().rooms_of(a.client_id()).is_empty());
}

#[tokio::test]
async fn invalid_rpc_payload_gets_no_reply() {
    let harness = TestHarness::new(build_core());
    let client = harness.connect(handshake("t1", None)).await.unwrap();

    client.send_raw(json!({ "type": "echo.ping", "payload": { "message": "" }, "rpcId": "r4" }).to_string());

    client.assert_silent(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn unknown_route_is_dropped() {
    let harness = TestHarness::new(build_core());
    let client = harness.connect(handshake("t1", None)).await.unwrap();

    client.send("no.such.route", json!({}));

    client.assert_silent(Duration::from_millis(200)).await;
}
