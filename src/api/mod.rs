//! HTTP surface: router assembly, middleware stack, and server startup.

use crate::auth::{AuthEngine, LogNotifier};
use crate::db::PgStore;
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;

use handlers::{auth, health, permissions, root, users};

/// The engine variant served over HTTP: Postgres persistence, log-only
/// email delivery.
pub type Engine = AuthEngine<PgStore, LogNotifier>;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::signup_request,
        auth::signup_verify,
        auth::login,
        auth::logout,
        auth::refresh,
        auth::forgot_password,
        auth::reset_password,
        auth::resend_otp,
        auth::change_password,
        users::profile,
        users::update_profile,
        users::deactivate,
        permissions::create,
        permissions::bulk_create,
        permissions::list,
        permissions::get_by_id,
        permissions::update,
        permissions::delete,
    ),
    components(schemas(
        handlers::ErrorBody,
        health::Health,
        auth::types::SignupRequest,
        auth::types::SignupRequestResponse,
        auth::types::VerifyOtpRequest,
        auth::types::SignupCompleteResponse,
        auth::types::LoginRequest,
        auth::types::UserSummaryResponse,
        auth::types::TokenResponse,
        auth::types::LoginResponse,
        auth::types::LogoutRequest,
        auth::types::RefreshRequest,
        auth::types::ForgotPasswordRequest,
        auth::types::ResetPasswordRequest,
        auth::types::ResendOtpRequest,
        auth::types::ChangePasswordRequest,
        auth::types::MessageResponse,
        users::UserProfileResponse,
        users::UserUpdateRequest,
        users::DeactivatedResponse,
        permissions::PermissionCreate,
        permissions::PermissionUpdate,
        permissions::PermissionResponse,
        permissions::PermissionListResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup, login, tokens, and password lifecycle"),
        (name = "users", description = "Current-user profile"),
        (name = "permissions", description = "Permission catalog for the RBAC model"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    config: crate::auth::AuthConfig,
    cors_origins: Option<&str>,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let engine = Arc::new(AuthEngine::new(
        PgStore::new(pool.clone()),
        LogNotifier,
        config,
    ));

    let cors = cors_layer(cors_origins)?;

    let app = Router::new()
        .route("/", get(root::root))
        .route("/api/v1/auth/signup/request", post(auth::signup_request))
        .route("/api/v1/auth/signup/verify", post(auth::signup_verify))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/forgot-password", post(auth::forgot_password))
        .route("/api/v1/auth/reset-password", post(auth::reset_password))
        .route("/api/v1/auth/resend-otp", post(auth::resend_otp))
        .route("/api/v1/auth/change-password", post(auth::change_password))
        .route(
            "/api/v1/users/me",
            get(users::profile)
                .put(users::update_profile)
                .delete(users::deactivate),
        )
        .route(
            "/api/v1/permissions",
            post(permissions::create).get(permissions::list),
        )
        .route("/api/v1/permissions/bulk", post(permissions::bulk_create))
        .route(
            "/api/v1/permissions/:id",
            get(permissions::get_by_id)
                .put(permissions::update)
                .delete(permissions::delete),
        )
        .merge(SwaggerUi::new("/api/v1/docs").url("/api/v1/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(engine))
                .layer(Extension(pool.clone())),
        )
        .route("/health", get(health::health).options(health::health))
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Permissive CORS for development unless explicit origins are
/// configured.
fn cors_layer(origins: Option<&str>) -> Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let Some(origins) = origins else {
        return Ok(cors.allow_origin(Any));
    };

    let mut values = Vec::new();
    for origin in origins.split(',') {
        values.push(parse_origin(origin.trim())?);
    }
    Ok(cors.allow_origin(AllowOrigin::list(values)))
}

fn parse_origin(origin: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(origin).with_context(|| format!("Invalid CORS origin: {origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("CORS origin must include a valid host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let value = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&value).context("Failed to build CORS origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_the_auth_routes() {
        let spec = openapi();
        let paths = &spec.paths.paths;
        assert!(paths.contains_key("/api/v1/auth/login"));
        assert!(paths.contains_key("/api/v1/auth/signup/request"));
        assert!(paths.contains_key("/api/v1/auth/refresh"));
        assert!(paths.contains_key("/api/v1/users/me"));
        assert!(paths.contains_key("/api/v1/permissions/{id}"));
        assert!(paths.contains_key("/health"));
    }

    #[test]
    fn parse_origin_strips_paths() {
        let value = parse_origin("https://app.pordisto.dev/ignored/path").unwrap();
        assert_eq!(value, "https://app.pordisto.dev");
    }

    #[test]
    fn parse_origin_keeps_explicit_port() {
        let value = parse_origin("http://localhost:5173").unwrap();
        assert_eq!(value, "http://localhost:5173");
    }

    #[test]
    fn parse_origin_rejects_garbage() {
        assert!(parse_origin("not a url").is_err());
    }

    #[test]
    fn cors_defaults_to_any_origin() {
        assert!(cors_layer(None).is_ok());
        assert!(cors_layer(Some("https://app.pordisto.dev,http://localhost:5173")).is_ok());
        assert!(cors_layer(Some("nope")).is_err());
    }
}
