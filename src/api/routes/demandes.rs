use actix_web::{delete, get, patch, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::AppState;
use crate::core::demande_service::{NewDemande, StatusUpdate};
use crate::domain::demande::{DemandeType, DemandeView, StatutCode};
use crate::domain::user::Actor;
use crate::infrastructure::database::{DemandeFilter, Pagination};
use crate::infrastructure::error::AppResult;

/// Paramètres de la liste complète (personnel)
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub statut: Option<StatutCode>,
    #[serde(rename = "type")]
    pub kind: Option<DemandeType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<ListParams> for DemandeFilter {
    fn from(params: ListParams) -> Self {
        let page = Pagination { limit: params.limit, offset: params.offset };
        page.apply(DemandeFilter {
            statut: params.statut,
            kind: params.kind,
            ..DemandeFilter::default()
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct DonneesUpdate {
    pub donnees: Value,
}

/// Crée une demande (citoyen, ou agent en mode guichet)
#[post("")]
pub async fn create(
    state: web::Data<AppState>,
    actor: Actor,
    body: web::Json<NewDemande>,
) -> AppResult<HttpResponse> {
    let demande = state.demandes.submit(&actor, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(DemandeView::from(&demande)))
}

/// Demandes du citoyen connecté, paginées par `limit` / `offset`
#[get("/mes-demandes")]
pub async fn list_mine(
    state: web::Data<AppState>,
    actor: Actor,
    page: web::Query<Pagination>,
) -> AppResult<HttpResponse> {
    let demandes = state.demandes.list_mine(&actor, page.into_inner()).await?;
    Ok(HttpResponse::Ok().json(demandes.iter().map(DemandeView::from).collect::<Vec<_>>()))
}

#[get("/statistiques")]
pub async fn statistics(state: web::Data<AppState>, actor: Actor) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.demandes.statistics(&actor).await?))
}

/// Toutes les demandes, filtrables par statut et type
#[get("")]
pub async fn list_all(
    state: web::Data<AppState>,
    actor: Actor,
    params: web::Query<ListParams>,
) -> AppResult<HttpResponse> {
    let filter = DemandeFilter::from(params.into_inner());
    let demandes = state.demandes.list_all(&actor, &filter).await?;
    Ok(HttpResponse::Ok().json(demandes.iter().map(DemandeView::from).collect::<Vec<_>>()))
}

#[get("/{id}")]
pub async fn get_one(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let demande = state.demandes.get(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(DemandeView::from(&demande)))
}

/// Acte HTML (A4, bilingue) d'une demande acceptée
#[get("/{id}/acte")]
pub async fn acte(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let acte = state.demandes.acte(&actor, path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(acte.render_html()))
}

#[patch("/{id}/statut")]
pub async fn update_status(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<StatusUpdate>,
) -> AppResult<HttpResponse> {
    let demande = state
        .demandes
        .update_status(&actor, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(DemandeView::from(&demande)))
}

#[patch("/{id}/donnees")]
pub async fn update_donnees(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
    body: web::Json<DonneesUpdate>,
) -> AppResult<HttpResponse> {
    let demande = state
        .demandes
        .edit(&actor, path.into_inner(), body.into_inner().donnees)
        .await?;
    Ok(HttpResponse::Ok().json(DemandeView::from(&demande)))
}

#[delete("/{id}")]
pub async fn delete(
    state: web::Data<AppState>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    state.demandes.delete(&actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use crate::api::{config, tests::{bearer, test_state}};
    use crate::domain::demande::tests::complete_birth;
    use crate::domain::user::Role;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    #[actix_web::test]
    async fn test_review_workflow() {
        let (state, store, emails) = test_state();
        let (_, citizen) = bearer(&store, Role::User, "citoyen@example.mr").await;
        let (agent_user, agent) = bearer(&store, Role::Agent, "agent@example.mr").await;
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/demandes")
            .insert_header(("Authorization", citizen.clone()))
            .set_json(json!({ "type": "naissance", "donnees": complete_birth().to_value() }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["statut"], "en_attente");
        assert_eq!(created["incomplete"], false);
        let id = created["id"].as_str().unwrap().to_string();

        // Un citoyen ne peut pas statuer
        let req = test::TestRequest::patch()
            .uri(&format!("/demandes/{}/statut", id))
            .insert_header(("Authorization", citizen.clone()))
            .set_json(json!({ "statut": "acceptee" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::patch()
            .uri(&format!("/demandes/{}/statut", id))
            .insert_header(("Authorization", agent.clone()))
            .set_json(json!({ "statut": "acceptee" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let accepted: Value = test::read_body_json(resp).await;
        assert_eq!(accepted["statut"], "acceptee");
        assert_eq!(accepted["traiteePar"], json!(agent_user.id));

        // Statut terminal : 409
        let req = test::TestRequest::patch()
            .uri(&format!("/demandes/{}/statut", id))
            .insert_header(("Authorization", agent.clone()))
            .set_json(json!({ "statut": "rejetee", "motifRejet": "Doublon" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);

        let req = test::TestRequest::get()
            .uri(&format!("/demandes/{}/acte", id))
            .insert_header(("Authorization", citizen.clone()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
        assert!(html.contains(&format!("https://etat-civil.test/verification/{}", id)));

        let req = test::TestRequest::get()
            .uri("/demandes/mes-demandes")
            .insert_header(("Authorization", citizen))
            .to_request();
        let mine: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(mine.as_array().unwrap().len(), 1);

        assert_eq!(emails.sent.lock().await.len(), 1);
    }

    #[actix_web::test]
    async fn test_incomplete_approval_is_unprocessable() {
        let (state, store, _) = test_state();
        let (_, agent) = bearer(&store, Role::Agent, "agent@example.mr").await;
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/demandes")
            .insert_header(("Authorization", agent.clone()))
            .set_json(json!({
                "type": "naissance",
                "guichet": true,
                "donnees": complete_birth().to_value(),
            }))
            .to_request();
        let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(created["userId"], Value::Null);
        let id = created["id"].as_str().unwrap().to_string();

        let mut donnees = complete_birth().to_value();
        donnees["nomEnfant"] = json!("");
        let req = test::TestRequest::patch()
            .uri(&format!("/demandes/{}/donnees", id))
            .insert_header(("Authorization", agent.clone()))
            .set_json(json!({ "donnees": donnees }))
            .to_request();
        let edited: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(edited["incomplete"], true);

        let req = test::TestRequest::patch()
            .uri(&format!("/demandes/{}/statut", id))
            .insert_header(("Authorization", agent))
            .set_json(json!({ "statut": "acceptee" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["details"], json!(["nomEnfant"]));
    }

    #[actix_web::test]
    async fn test_malformed_edit_is_unprocessable() {
        let (state, store, _) = test_state();
        let (_, citizen) = bearer(&store, Role::User, "citoyen@example.mr").await;
        let (_, agent) = bearer(&store, Role::Agent, "agent@example.mr").await;
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/demandes")
            .insert_header(("Authorization", citizen))
            .set_json(json!({ "type": "naissance", "donnees": complete_birth().to_value() }))
            .to_request();
        let created: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let id = created["id"].as_str().unwrap().to_string();

        let mut donnees = complete_birth().to_value();
        donnees["sexe"] = json!("X");
        donnees["dateNaissance"] = json!("demain");
        let req = test::TestRequest::patch()
            .uri(&format!("/demandes/{}/donnees", id))
            .insert_header(("Authorization", agent.clone()))
            .set_json(json!({ "donnees": donnees }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["details"], json!(["sexe", "dateNaissance"]));

        let req = test::TestRequest::get()
            .uri(&format!("/demandes/{}", id))
            .insert_header(("Authorization", agent))
            .to_request();
        let stored: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(stored["donnees"]["sexe"], "M");
    }

    #[actix_web::test]
    async fn test_mes_demandes_is_paginated() {
        let (state, store, _) = test_state();
        let (_, citizen) = bearer(&store, Role::User, "citoyen@example.mr").await;
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        for _ in 0..3 {
            let req = test::TestRequest::post()
                .uri("/demandes")
                .insert_header(("Authorization", citizen.clone()))
                .set_json(json!({ "type": "naissance", "donnees": complete_birth().to_value() }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 201);
        }

        for (query, expected) in [("", 3), ("?limit=2", 2), ("?limit=2&offset=2", 1), ("?offset=5", 0)] {
            let req = test::TestRequest::get()
                .uri(&format!("/demandes/mes-demandes{}", query))
                .insert_header(("Authorization", citizen.clone()))
                .to_request();
            let mine: Value = test::read_body_json(test::call_service(&app, req).await).await;
            assert_eq!(mine.as_array().unwrap().len(), expected, "{}", query);
        }
    }

    #[actix_web::test]
    async fn test_list_all_filters_and_statistics() {
        let (state, store, _) = test_state();
        let (_, citizen) = bearer(&store, Role::User, "citoyen@example.mr").await;
        let (_, admin) = bearer(&store, Role::Admin, "admin@example.mr").await;
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        for _ in 0..2 {
            let req = test::TestRequest::post()
                .uri("/demandes")
                .insert_header(("Authorization", citizen.clone()))
                .set_json(json!({ "type": "naissance", "donnees": complete_birth().to_value() }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 201);
        }

        let req = test::TestRequest::get()
            .uri("/demandes")
            .insert_header(("Authorization", citizen))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri("/demandes?statut=en_attente&type=naissance&limit=1")
            .insert_header(("Authorization", admin.clone()))
            .to_request();
        let page: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(page.as_array().unwrap().len(), 1);

        let req = test::TestRequest::get()
            .uri("/demandes/statistiques")
            .insert_header(("Authorization", admin))
            .to_request();
        let stats: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["parStatut"]["en_attente"], 2);
        assert_eq!(stats["parType"]["mariage"], 0);
    }
}
