//! Exports tableur : lignes à plat et nom de fichier, le fichier `.xlsx`
//! est produit côté client.

use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use std::collections::HashMap;

use crate::api::AppState;
use crate::core::export::{demandes_sheet, users_sheet};
use crate::domain::user::Actor;
use crate::infrastructure::database::DemandeFilter;
use crate::infrastructure::error::AppResult;

const EXPORT_LIMIT: i64 = 100_000;

#[get("/demandes")]
pub async fn demandes(state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
    let filter = DemandeFilter { limit: EXPORT_LIMIT, ..Default::default() };
    let demandes = state.demandes.list_all(&actor, &filter).await?;
    let users: HashMap<_, _> = state
        .users
        .directory(&actor)
        .await?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    Ok(HttpResponse::Ok().json(demandes_sheet(&demandes, &users, Utc::now())))
}

#[get("/utilisateurs")]
pub async fn utilisateurs(state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
    let users = state.users.directory(&actor).await?;
    Ok(HttpResponse::Ok().json(users_sheet(&users, Utc::now())))
}
