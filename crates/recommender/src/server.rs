//! HTTP serving layer
//!
//! - `GET /health`
//! - `GET /`: recommendations for the configured home user
//! - `GET /recommend/{user_id}?count=N`
//! - `POST /interactions`

use crate::catalog::ItemCatalog;
use crate::engine::{ModelSummary, RecommendationEngine};
use crate::error::RecError;
use crate::interactions::Interaction;
use crate::retrieval::ScoredItem;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub catalog: Arc<ItemCatalog>,
    pub home_user: Option<usize>,
    pub default_count: usize,
    pub max_count: usize,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home_recommendations))
        .route("/health", web::get().to(health_check))
        .route("/recommend/{user_id}", web::get().to(recommend_for_user))
        .route("/interactions", web::post().to(ingest_interactions));
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedBook {
    pub item_id: usize,
    pub score: f32,
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub user_id: usize,
    pub recommendations_count: usize,
    pub recommendations: Vec<RecommendedBook>,
}

impl RecommendResponse {
    fn new(user_id: usize, items: Vec<ScoredItem>, catalog: &ItemCatalog) -> Self {
        let recommendations: Vec<RecommendedBook> = items
            .into_iter()
            .map(|item| RecommendedBook {
                item_id: item.item_id,
                score: item.score,
                title: catalog.title(item.item_id),
            })
            .collect();

        Self {
            user_id,
            recommendations_count: recommendations.len(),
            recommendations,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub interactions: Vec<Interaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub refitted_users: Vec<usize>,
    pub model_version: u64,
}

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let model: Option<ModelSummary> = state.engine.summary().ok();
    let status = if model.is_some() { "healthy" } else { "initializing" };

    HttpResponse::Ok().json(serde_json::json!({
        "status": status,
        "service": "bookrec-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "model": model,
        "catalog_items": state.catalog.len(),
    }))
}

async fn home_recommendations(state: web::Data<AppState>) -> Result<HttpResponse, RecError> {
    let Some(user_id) = state.home_user else {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "no_home_user",
            "message": "No home user configured (set BOOKREC_HOME_USER)",
        })));
    };

    let recommendations = state.engine.recommend(user_id, state.default_count as i64)?;
    Ok(HttpResponse::Ok().json(RecommendResponse::new(
        user_id,
        recommendations,
        &state.catalog,
    )))
}

async fn recommend_for_user(
    state: web::Data<AppState>,
    path: web::Path<usize>,
    query: web::Query<RecommendQuery>,
) -> Result<HttpResponse, RecError> {
    let user_id = path.into_inner();
    let count = query.count.unwrap_or(state.default_count as i64);

    if count <= 0 || count > state.max_count as i64 {
        tracing::warn!(user_id, count, "Rejected recommendation count");
        return Ok(HttpResponse::BadRequest().json(serde_json::json!({
            "error": "invalid_count",
            "message": format!("Count must be between 1 and {}", state.max_count),
        })));
    }

    let recommendations = state.engine.recommend(user_id, count)?;

    Ok(HttpResponse::Ok().json(RecommendResponse::new(
        user_id,
        recommendations,
        &state.catalog,
    )))
}

async fn ingest_interactions(
    state: web::Data<AppState>,
    body: web::Json<IngestRequest>,
) -> Result<HttpResponse, RecError> {
    let interactions = body.into_inner().interactions;
    let mut users = BTreeSet::new();
    for (index, interaction) in interactions.iter().enumerate() {
        let user = usize::try_from(interaction.user_id).map_err(|_| {
            RecError::invalid_interaction(index, format!("negative user_id {}", interaction.user_id))
        })?;
        users.insert(user);
    }

    let engine = Arc::clone(&state.engine);
    let refit_users = users.clone();
    let model_version = web::block(move || engine.ingest_and_refit(&interactions, &refit_users))
        .await
        .map_err(|e| RecError::Solver(format!("refit task failed: {}", e)))??;

    Ok(HttpResponse::Ok().json(IngestResponse {
        refitted_users: users.into_iter().collect(),
        model_version,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogItem;
    use crate::config::AlsConfig;
    use actix_web::{http::StatusCode, test, App};

    fn catalog() -> Arc<ItemCatalog> {
        let items = vec![
            CatalogItem {
                id: 0,
                title: "Solaris".to_string(),
            },
            CatalogItem {
                id: 1,
                title: "Roadside Picnic".to_string(),
            },
        ];
        Arc::new(ItemCatalog::new(items).unwrap())
    }

    fn trained_state() -> web::Data<AppState> {
        trained_state_with_home(None)
    }

    fn trained_state_with_home(home_user: Option<usize>) -> web::Data<AppState> {
        let engine = RecommendationEngine::new(AlsConfig::new(2, 0.1, 5));
        engine
            .train_from_scratch(&[
                Interaction::new(0, 0, 5.0),
                Interaction::new(0, 1, 1.0),
                Interaction::new(1, 1, 4.0),
                Interaction::new(1, 2, 2.0),
            ])
            .unwrap();
        web::Data::new(AppState {
            engine: Arc::new(engine),
            catalog: catalog(),
            home_user,
            default_count: 100,
            max_count: 1000,
        })
    }

    #[actix_web::test]
    async fn test_health() {
        let app = test::init_service(App::new().app_data(trained_state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"]["rank"], 2);
        assert_eq!(body["catalog_items"], 2);
    }

    #[actix_web::test]
    async fn test_recommend_endpoint() {
        let app = test::init_service(App::new().app_data(trained_state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/recommend/0?count=5").to_request();
        let body: RecommendResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.user_id, 0);
        assert_eq!(body.recommendations_count, 1);
        assert_eq!(body.recommendations[0].item_id, 2);
        assert_eq!(body.recommendations[0].title, "Unknown book (ID: 2)");
    }

    #[actix_web::test]
    async fn test_home_recommendations() {
        let app = test::init_service(
            App::new()
                .app_data(trained_state_with_home(Some(1)))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body: RecommendResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.user_id, 1);
        assert_eq!(body.recommendations_count, 1);
        assert_eq!(body.recommendations[0].item_id, 0);
        assert_eq!(body.recommendations[0].title, "Solaris");
    }

    #[actix_web::test]
    async fn test_home_without_configured_user() {
        let app = test::init_service(App::new().app_data(trained_state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_recommend_rejects_bad_count() {
        let app = test::init_service(App::new().app_data(trained_state()).configure(configure)).await;

        for uri in ["/recommend/0?count=0", "/recommend/0?count=1001", "/recommend/0?count=-4"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_recommend_unknown_user() {
        let app = test::init_service(App::new().app_data(trained_state()).configure(configure)).await;

        let req = test::TestRequest::get().uri("/recommend/99").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_recommend_untrained() {
        let state = web::Data::new(AppState {
            engine: Arc::new(RecommendationEngine::new(AlsConfig::default())),
            catalog: catalog(),
            home_user: Some(0),
            default_count: 100,
            max_count: 1000,
        });
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/recommend/0").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_ingest_then_recommend() {
        let app = test::init_service(App::new().app_data(trained_state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/interactions")
            .set_json(serde_json::json!({
                "interactions": [{"user_id": 2, "item_id": 1, "rating": 5}]
            }))
            .to_request();
        let body: IngestResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.refitted_users, vec![2]);

        let req = test::TestRequest::get().uri("/recommend/2?count=1").to_request();
        let body: RecommendResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.recommendations_count, 1);
        assert_ne!(body.recommendations[0].item_id, 1);
        assert_ne!(body.recommendations[0].title, "Roadside Picnic");
    }

    #[actix_web::test]
    async fn test_ingest_rejects_negative_ids() {
        let app = test::init_service(App::new().app_data(trained_state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/interactions")
            .set_json(serde_json::json!({
                "interactions": [{"user_id": -1, "item_id": 1, "rating": 5}]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
