use actix_web::{get, web, HttpResponse};
use uuid::Uuid;

use crate::api::AppState;
use crate::infrastructure::error::AppResult;

/// Vérification publique d'un acte (cible du QR code imprimé)
#[get("/verification/{id}")]
pub async fn verify(state: web::Data<AppState>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.demandes.verify(path.into_inner()).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::{config, tests::test_state};
    use crate::domain::demande::tests::complete_birth;
    use crate::domain::demande::Demande;
    use crate::infrastructure::database::DemandeStore;
    use crate::utils::security::verification_code;
    use crate::utils::Config;
    use actix_web::{test, App};
    use assert_json_diff::assert_json_include;
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_only_accepted_requests_verify() {
        let (state, store, _) = test_state();
        let pending = Demande::new(complete_birth(), None, None);
        let mut accepted = Demande::new(complete_birth(), None, None);
        accepted.approve(None).unwrap();
        store.insert_demande(&pending).await.unwrap();
        store.insert_demande(&accepted).await.unwrap();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/verification/{}", pending.id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get()
            .uri(&format!("/verification/{}", accepted.id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_json_include!(
            actual: body.clone(),
            expected: json!({
                "id": accepted.id,
                "statut": "acceptee",
                "type": "naissance",
                "codeVerification": verification_code(accepted.id, &Config::for_tests().jwt_secret),
            })
        );
        assert!(body.get("donnees").is_none());
    }
}
