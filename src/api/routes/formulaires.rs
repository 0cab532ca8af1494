//! Schémas des formulaires par étapes, validation d'étape côté serveur et
//! extraction du NNI d'une carte d'identité (image scannée ou texte déjà reconnu).

use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::AppState;
use crate::domain::demande::DemandeType;
use crate::domain::wizard;
use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::ocr::extract_nni;

#[get("/formulaires/{type}")]
pub async fn get_schema(path: web::Path<DemandeType>) -> HttpResponse {
    HttpResponse::Ok().json(wizard::schema(path.into_inner()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepValidation {
    pub step: usize,
    pub valid: bool,
}

/// Valide une étape ; un champ manquant ou invalide donne une 422 listant les champs.
#[post("/formulaires/{type}/etapes/{index}/valider")]
pub async fn validate_step(
    path: web::Path<(DemandeType, usize)>,
    values: web::Json<Map<String, Value>>,
) -> AppResult<HttpResponse> {
    let (kind, index) = path.into_inner();
    wizard::validate_step(kind, index, &values)?;

    Ok(HttpResponse::Ok().json(StepValidation {
        step: index,
        valid: true,
    }))
}

/// `image` : data URL de la carte scannée ; `texte` : texte déjà reconnu.
#[derive(Debug, Deserialize)]
pub struct NniRequest {
    pub texte: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NniResponse {
    pub nni: Option<String>,
}

/// `nni: null` : aucun numéro reconnu, saisie manuelle attendue.
/// Moteur OCR indisponible : 503, la saisie manuelle reste possible.
#[post("/formulaires/nni")]
pub async fn nni(
    state: web::Data<AppState>,
    body: web::Json<NniRequest>,
) -> AppResult<HttpResponse> {
    let NniRequest { texte, image } = body.into_inner();

    let nni = match (image, texte) {
        (Some(image), _) => state.scanner.scan_data_url(&image).await?.nni,
        (None, Some(texte)) => extract_nni(&texte),
        (None, None) => {
            return Err(AppError::BadRequest(
                "Champ `image` ou `texte` requis".to_string(),
            ))
        }
    };

    Ok(HttpResponse::Ok().json(NniResponse { nni }))
}

#[cfg(test)]
mod tests {
    use crate::api::config;
    use crate::api::tests::{test_state, test_state_with_recognizer};
    use crate::utils::ocr::{OcrError, TextRecognizer};
    use actix_web::{test, App};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_schema_and_step_validation() {
        let (state, _, _) = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/formulaires/deces").to_request();
        let schema: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(schema["steps"].as_array().unwrap().len(), 3);

        let req = test::TestRequest::post()
            .uri("/formulaires/naissance/etapes/0/valider")
            .set_json(json!({ "nomEnfant": "Ba", "prenomEnfant": " ", "sexe": "M" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["details"], json!(["prenomEnfant", "dateNaissance", "lieuNaissance"]));

        let req = test::TestRequest::post()
            .uri("/formulaires/naissance/etapes/9/valider")
            .set_json(json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_nni_extraction() {
        let (state, _, _) = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/formulaires/nni")
            .set_json(json!({ "texte": "REPUBLIQUE ISLAMIQUE\nNNI: 1234567890\nNé le 01/01/1990" }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["nni"], "1234567890");

        let req = test::TestRequest::post()
            .uri("/formulaires/nni")
            .set_json(json!({ "texte": "illisible" }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["nni"], Value::Null);

        let req = test::TestRequest::post()
            .uri("/formulaires/nni")
            .set_json(json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    struct CardText;

    #[async_trait]
    impl TextRecognizer for CardText {
        async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
            assert_eq!(image, b"image");
            Ok("CARTE NATIONALE\nNNI 0123456789".to_string())
        }
    }

    #[actix_web::test]
    async fn test_nni_from_scanned_image() {
        let state = test_state_with_recognizer(Arc::new(CardText));
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/formulaires/nni")
            .set_json(json!({ "image": "data:image/png;base64,aW1hZ2U=" }))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["nni"], "0123456789");

        let req = test::TestRequest::post()
            .uri("/formulaires/nni")
            .set_json(json!({ "image": "data:image/png;base64,%%%" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_nni_scan_without_engine_is_unavailable() {
        let (state, _, _) = test_state();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/formulaires/nni")
            .set_json(json!({ "image": "data:image/png;base64,aW1hZ2U=" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], 503);
    }
}
