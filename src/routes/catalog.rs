use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};

use super::moved_permanently;
use crate::{
    error::{AppError, Result},
    models::{Category, Episode, Programme},
    state::AppState,
};

/// GET /bbc/categories
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    let categories = state.catalog.list_categories().await;
    if categories.is_empty() {
        return Err(AppError::Missing("No categories found".into()));
    }
    Ok(Json(categories))
}

/// GET /bbc/programmes
pub async fn list_programmes(State(state): State<AppState>) -> Result<Json<Vec<Programme>>> {
    let programmes = state.catalog.list_programmes().await;
    if programmes.is_empty() {
        return Err(AppError::Missing("No programmes found".into()));
    }
    Ok(Json(programmes))
}

/// GET /bbc/programmes/:pid
pub async fn get_programme(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> Result<Json<Programme>> {
    state
        .catalog
        .get_programme(&pid)
        .await
        .map(Json)
        .ok_or_else(|| AppError::Missing(format!("Programme {pid} not found")))
}

/// GET /bbc/programmes/:pid/episodes
pub async fn list_episodes(
    State(state): State<AppState>,
    Path(pid): Path<String>,
) -> Result<Json<Vec<Episode>>> {
    let episodes = state.catalog.get_episodes(&pid).await?;
    if episodes.is_empty() {
        return Err(AppError::Missing(format!("No episodes found for {pid}")));
    }
    Ok(Json(episodes))
}

/// GET /bbc/programmes/:pid/poster
pub async fn poster(State(state): State<AppState>, Path(pid): Path<String>) -> Result<Response> {
    let programme = state
        .catalog
        .get_programme(&pid)
        .await
        .ok_or_else(|| AppError::Missing(format!("Programme {pid} not found")))?;

    let url = programme
        .poster_url(&state.config.poster_recipe)
        .ok_or_else(|| AppError::Missing(format!("No poster for {pid}")))?;

    Ok(moved_permanently(&url))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::{
        catalog::fixtures::{BASE, episode, page, programme, seed, seed_programme},
        routes::test_support::app,
    };

    #[tokio::test]
    async fn empty_catalogue_lists_are_not_found() {
        let (server, _catalog, _client) = app();

        server.get("/bbc/categories").await.assert_status_not_found();
        server.get("/bbc/programmes").await.assert_status_not_found();
    }

    #[tokio::test]
    async fn programme_lookup() {
        let (server, catalog, _client) = app();
        seed_programme(&catalog, "b0001", "Show").await;

        let response = server.get("/bbc/programmes").await;
        response.assert_status_ok();
        let list: Vec<serde_json::Value> = response.json();
        assert_eq!(list.len(), 1);

        let response = server.get("/bbc/programmes/b0001").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["title"], "Show");
        assert_eq!(body["episodes"], json!([]));

        server
            .get("/bbc/programmes/nope")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn episodes_are_fetched_on_demand() {
        let (server, catalog, client) = app();
        seed_programme(&catalog, "b0001", "Show").await;
        page(
            &client,
            &format!("{BASE}/episodes/b0001"),
            json!({"entities": {"results": [episode("e1", "One")]}}),
        );

        let response = server.get("/bbc/programmes/b0001/episodes").await;

        response.assert_status_ok();
        let episodes: Vec<serde_json::Value> = response.json();
        assert_eq!(episodes[0]["id"], "e1");
        assert_eq!(episodes[0]["title"], "One");
    }

    #[tokio::test]
    async fn episode_failures_map_to_statuses() {
        let (server, catalog, client) = app();
        seed_programme(&catalog, "b0001", "Show").await;
        seed_programme(&catalog, "b0002", "Quiet").await;
        client.respond(&format!("{BASE}/episodes/b0001"), 503, "");
        page(&client, &format!("{BASE}/episodes/b0002"), json!({"entities": {}}));

        server
            .get("/bbc/programmes/b0001/episodes")
            .await
            .assert_status(StatusCode::BAD_GATEWAY);
        server
            .get("/bbc/programmes/b0002/episodes")
            .await
            .assert_status_not_found();
        server
            .get("/bbc/programmes/nope/episodes")
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn poster_redirects_with_recipe() {
        let (server, catalog, _client) = app();
        let mut with_poster = programme("b0001", "Show");
        with_poster.image_poster = "https://ichef.test/images/{recipe}/p01.jpg".into();
        seed(&catalog, with_poster).await;
        seed_programme(&catalog, "b0002", "No poster").await;

        let response = server.get("/bbc/programmes/b0001/poster").await;

        response.assert_status(StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.header("location"),
            "https://ichef.test/images/464x261/p01.jpg"
        );
        server
            .get("/bbc/programmes/b0002/poster")
            .await
            .assert_status_not_found();
    }
}
