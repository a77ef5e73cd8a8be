use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zocket_core::context::{ConnectionContext, RequestContext};
use zocket_core::router::{ProcedureBuilder, Router, RouterBuilder};
use zocket_core::schema::TypedValidator;

/// Handshake metadata: every connection names itself.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct UsernameHeader {
    #[garde(length(min = 1, max = 32))]
    pub username: String,
}

impl UsernameHeader {
    pub fn validator() -> TypedValidator<Self> {
        TypedValidator::new()
    }
}

#[derive(Debug, Deserialize, Validate)]
struct JoinInput {
    #[garde(length(min = 1, max = 64))]
    room: String,
}

#[derive(Debug, Deserialize, Validate)]
struct SayInput {
    #[garde(length(min = 1, max = 64))]
    room: String,
    #[garde(length(min = 1, max = 1024))]
    text: String,
}

pub fn build() -> Router {
    RouterBuilder::new()
        .group("chat", |chat| {
            chat.route(
                "join",
                ProcedureBuilder::incoming().schema(TypedValidator::<JoinInput>::new()).handler(
                    |ctx: RequestContext, payload: Value| async move {
                        let input: JoinInput = serde_json::from_value(payload).expect("validated upstream");
                        let joined = ctx.rooms().join(input.room).await;
                        Ok(Some(json!(joined)))
                    },
                ),
            )
            .route(
                "leave",
                ProcedureBuilder::incoming().schema(TypedValidator::<JoinInput>::new()).handler(
                    |ctx: RequestContext, payload: Value| async move {
                        let input: JoinInput = serde_json::from_value(payload).expect("validated upstream");
                        let left = ctx.rooms().leave(input.room).await;
                        Ok(Some(json!(left)))
                    },
                ),
            )
            .route(
                "say",
                ProcedureBuilder::incoming().schema(TypedValidator::<SayInput>::new()).handler(
                    |ctx: RequestContext, payload: Value| async move {
                        let input: SayInput = serde_json::from_value(payload).expect("validated upstream");
                        let username = ctx.get("username").unwrap_or(Value::String("anonymous".to_string()));
                        ctx.send()
                            .to_room([input.room])
                            .emit("chat.onMessage", json!({ "username": username, "text": input.text }))
                            .await;
                        Ok(None)
                    },
                ),
            )
            .out("onMessage")
        })
        .build()
        .expect("chat demo router is well-formed")
}

pub async fn on_connect(ctx: ConnectionContext) -> Result<(), String> {
    let username = ctx
        .handshake_values()
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("anonymous")
        .to_string();
    ctx.set("username", Value::String(username.clone()));
    tracing::info!(client_id = ctx.client_id(), username, "chat client connected");
    Ok(())
}

pub async fn on_disconnect(ctx: ConnectionContext) -> Result<(), String> {
    tracing::info!(client_id = ctx.client_id(), rooms = ?ctx.rooms(), "chat client disconnected");
    Ok(())
}
