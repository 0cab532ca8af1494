//! # API Middleware
//!
//! - `AuthMiddleware` : vérifie le jeton `Authorization: Bearer <jwt>`, recharge
//!   l'utilisateur (rôle courant, compte supprimé refusé) et dépose un [`Actor`]
//!   dans les extensions de la requête.
//! - `Actor` est ensuite extrait directement dans les handlers.
//!
//! Un jeton absent, invalide ou expiré donne une 401 au format d'erreur commun.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::api::AppState;
use crate::domain::user::Actor;
use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::security::verify_access_token;

/// Middleware d'authentification JWT
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let authenticated = authenticate(&req).await;
            match authenticated {
                Ok(actor) => {
                    req.extensions_mut().insert(actor);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(e) => {
                    tracing::debug!(path = %req.path(), error = %e, "Requête non authentifiée");
                    Ok(req.error_response(e).map_into_right_body())
                }
            }
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn authenticate(req: &ServiceRequest) -> AppResult<Actor> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| AppError::InternalError("État applicatif non configuré".to_string()))?;

    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized("En-tête Authorization manquant".to_string()))?;
    let claims = verify_access_token(token, &state.config.jwt_secret)?;

    let user = state
        .users
        .me(&Actor { id: claims.sub, role: claims.role })
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::Unauthorized("Compte introuvable".to_string()),
            other => other,
        })?;

    Ok(Actor { id: user.id, role: user.role })
}

impl FromRequest for Actor {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Actor>()
                .copied()
                .ok_or_else(|| AppError::Unauthorized("Authentification requise".to_string())),
        )
    }
}
