use axum::response::{IntoResponse, Json};
use serde_json::json;

// axum handler for the service banner
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Pordisto API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/v1/docs",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn banner_is_ok() {
        let response = root().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
