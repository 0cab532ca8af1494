use actix_web::{post, web, HttpResponse};

use crate::api::AppState;
use crate::domain::user::{LoginForm, NewUser};
use crate::infrastructure::error::AppResult;

/// Endpoint d'inscription (rôle citoyen)
#[post("/auth/register")]
pub async fn register(
    state: web::Data<AppState>,
    form: web::Json<NewUser>,
) -> AppResult<HttpResponse> {
    let response = state.users.register(form.into_inner()).await?;
    Ok(HttpResponse::Created().json(response))
}

/// Endpoint de connexion (email/mot de passe)
#[post("/auth/login")]
pub async fn login(
    state: web::Data<AppState>,
    credentials: web::Json<LoginForm>,
) -> AppResult<HttpResponse> {
    let response = state.users.login(credentials.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}
