use actix_web::{delete, get, patch, web, HttpResponse};
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::user::{Actor, ProfileUpdate, RoleUpdate};
use crate::infrastructure::error::AppResult;

#[get("/me")]
pub async fn me(state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.users.me(&actor).await?))
}

#[patch("/me")]
pub async fn update_me(
    state: web::Data<AppState>,
    actor: Actor,
    body: web::Json<ProfileUpdate>,
) -> AppResult<HttpResponse> {
    let user = state.users.update_me(&actor, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Liste des utilisateurs (administrateurs)
#[get("")]
pub async fn list(state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.users.list(&actor).await?))
}

#[patch("/{id}/role")]
pub async fn update_role(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<RoleUpdate>,
) -> AppResult<HttpResponse> {
    let user = state
        .users
        .update_role(&actor, path.into_inner(), body.into_inner().role)
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/{id}")]
pub async fn delete(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    state.users.delete(&actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
