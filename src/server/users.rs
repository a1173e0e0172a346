use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{parse_body, require_text, AppState, IdPath};
use crate::error::{AppError, AppResult};
use crate::identity::{authorize, Action, Operation, RequestContext, Resource, Role};
use crate::storage::users::{self, NewUser, PublicUser, UserUpdate};

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

fn op(a: Action) -> Operation {
    Operation::Crud(Resource::User, a)
}

fn parse_role(raw: &str) -> AppResult<Role> {
    raw.parse::<Role>().map_err(AppError::validation)
}

pub async fn list(State(state): State<AppState>, ctx: RequestContext) -> AppResult<Json<Vec<PublicUser>>> {
    authorize(&ctx.principal, op(Action::List))?;
    Ok(Json(state.store.call(|c| users::list_users(c)).await?))
}

pub async fn get_one(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<PublicUser>> {
    authorize(&ctx.principal, op(Action::Get))?;
    let id = id.get()?;
    Ok(Json(state.store.call(move |c| users::get_user(c, id)).await?))
}

pub async fn create(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    authorize(&ctx.principal, op(Action::Create))?;
    let p: UserPayload = parse_body(&body)?;
    let (Some(email), Some(password), Some(role)) = (p.email, p.password, p.role) else {
        return Err(AppError::validation("missing data"));
    };
    require_text(&email, "email")?;
    require_text(&password, "password")?;
    let new = NewUser { email, password, role: parse_role(&role)? };
    let user = state.store.call(move |c| users::create_user(c, &new)).await?;
    info!(target: "api", request_id = %ctx.request_id, by = ctx.principal.user_id, user_id = user.id, role = %user.role, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update(
    State(state): State<AppState>,
    ctx: RequestContext,
    id: IdPath<i64>,
    body: Bytes,
) -> AppResult<Json<PublicUser>> {
    authorize(&ctx.principal, op(Action::Update))?;
    let id = id.get()?;
    let p: UserPayload = parse_body(&body)?;
    let (Some(email), Some(role)) = (p.email, p.role) else {
        return Err(AppError::validation("missing data"));
    };
    require_text(&email, "email")?;
    // An empty password keeps the current one
    let upd = UserUpdate { email, password: p.password.filter(|pw| !pw.is_empty()), role: parse_role(&role)? };
    let user = state.store.call(move |c| users::update_user(c, id, &upd)).await?;
    info!(target: "api", request_id = %ctx.request_id, by = ctx.principal.user_id, user_id = id, "user updated");
    Ok(Json(user))
}

pub async fn remove(State(state): State<AppState>, ctx: RequestContext, id: IdPath<i64>) -> AppResult<Json<Value>> {
    authorize(&ctx.principal, op(Action::Delete))?;
    let id = id.get()?;
    state.store.call(move |c| users::delete_user(c, id)).await?;
    info!(target: "api", request_id = %ctx.request_id, by = ctx.principal.user_id, user_id = id, "user deleted");
    Ok(Json(json!({ "message": "user deleted" })))
}
