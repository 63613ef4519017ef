use std::net::SocketAddr;
use std::path::Path;

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, ORIGIN},
        HeaderName, HeaderValue, Method,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::{
    config::{AppConfig, CorsConfig},
    error::AppError,
    state::AppState,
    users,
};

pub fn build_app(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new().nest(
        "/api",
        Router::new()
            .merge(users::router())
            .route("/health", get(|| async { "ok" })),
    );

    if config.environment.is_production() {
        router = router.fallback_service(static_assets(&config.static_dir));
    }

    router
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            config.cors.clone(),
            reject_foreign_origin,
        ))
        .layer(cors_layer(&config.cors))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

/// Serves the built dashboard, falling back to `index.html` for client routes.
fn static_assets(dir: &str) -> ServeDir<ServeFile> {
    ServeDir::new(dir).fallback(ServeFile::new(Path::new(dir).join("index.html")))
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let cors = cors.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                origin.to_str().map(|o| cors.is_allowed(o)).unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// Requests without an `Origin` header (curl, server-to-server) pass through.
async fn reject_foreign_origin(
    State(cors): State<CorsConfig>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(origin) = request.headers().get(ORIGIN) {
        let origin = origin.to_str().unwrap_or_default();
        if !cors.is_allowed(origin) {
            warn!(%origin, "blocked CORS origin");
            return AppError::CorsRejected.into_response();
        }
        if !cors.allowed_origins.iter().any(|o| o == origin) {
            debug!(%origin, "allowing localhost origin dynamically");
        }
    }
    next.run(request).await
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Environment;

    struct TestResponse {
        status: StatusCode,
        set_cookie: Option<String>,
        body: Value,
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut req = axum::http::Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => req
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            set_cookie,
            body,
        }
    }

    /// `jwt=<token>` taken from a `Set-Cookie` header.
    fn cookie_pair(set_cookie: &str) -> String {
        set_cookie.split(';').next().unwrap().trim().to_string()
    }

    async fn signup_and_login(app: &Router) -> (Value, String) {
        let res = send(
            app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({
                "name": "Ada",
                "email": "a@x.com",
                "phone": "+15550000000",
                "password": "secret1"
            })),
        )
        .await;
        assert_eq!(res.status, StatusCode::CREATED);
        let signed_up = res.body;

        let res = send(
            app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        let cookie = cookie_pair(&res.set_cookie.expect("login sets cookie"));
        (signed_up, cookie)
    }

    #[tokio::test]
    async fn signup_login_me_end_to_end() {
        let app = build_app(AppState::fake());
        let (signed_up, cookie) = signup_and_login(&app).await;

        assert_eq!(signed_up["name"], "Ada");
        assert_eq!(signed_up["email"], "a@x.com");
        assert!(signed_up.get("phone").is_none());
        assert!(signed_up.get("password").is_none());
        assert!(cookie.starts_with("jwt="));

        let me = send(&app, Method::GET, "/api/users/me", Some(&cookie), None).await;
        assert_eq!(me.status, StatusCode::OK);
        assert_eq!(me.body["id"], signed_up["id"]);
        assert_eq!(me.body["name"], signed_up["name"]);
        assert_eq!(me.body["email"], signed_up["email"]);
        assert_eq!(me.body["phone"], "+15550000000");
        assert!(me.body.get("password_hash").is_none());

        let wrong = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "wrong" })),
        )
        .await;
        let unknown = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "email": "nobody@x.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(wrong.status, StatusCode::BAD_REQUEST);
        assert_eq!(wrong.status, unknown.status);
        assert_eq!(wrong.body, unknown.body);
        assert!(wrong.set_cookie.is_none());
    }

    #[tokio::test]
    async fn login_cookie_attributes() {
        let app = build_app(AppState::fake());
        send(
            &app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"name": "Ada", "email": "a@x.com", "phone": "+1", "password": "secret1"})),
        )
        .await;
        let res = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "secret1" })),
        )
        .await;
        let set_cookie = res.set_cookie.unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Max-Age=2592000"));
        assert!(!set_cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let app = build_app(AppState::fake());
        signup_and_login(&app).await;
        let res = send(
            &app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"name": "Other", "email": "a@x.com", "phone": "+2", "password": "different"})),
        )
        .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["error"], "User already exists");
    }

    #[tokio::test]
    async fn signup_with_missing_field_is_json_validation_error() {
        let app = build_app(AppState::fake());
        let res = send(
            &app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"name": "Ada", "email": "a@x.com", "password": "secret1"})),
        )
        .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        let error = res.body["error"].as_str().expect("json error body");
        assert!(error.contains("phone"), "{error}");
    }

    #[tokio::test]
    async fn malformed_json_body_is_json_validation_error() {
        let app = build_app(AppState::fake());
        let req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/users/login")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email": "a@x.com","#))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn protected_routes_require_a_valid_session() {
        let app = build_app(AppState::fake());

        let res = send(&app, Method::GET, "/api/users/me", None, None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.body["error"], "Unauthorized");

        let res = send(&app, Method::GET, "/api/users/me", Some("jwt=not.a.token"), None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);

        let res = send(
            &app,
            Method::PUT,
            "/api/users/update",
            None,
            Some(json!({ "name": "x" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);

        let res = send(&app, Method::DELETE, "/api/users/delete", None, None).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_clears_cookie_but_does_not_revoke_token() {
        let app = build_app(AppState::fake());
        let (_, cookie) = signup_and_login(&app).await;

        let res = send(&app, Method::POST, "/api/users/logout", None, None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body["message"].is_string());
        let cleared = res.set_cookie.unwrap();
        assert!(cleared.starts_with("jwt=;"));
        assert!(cleared.contains("Max-Age=0"));

        // stateless tokens stay valid until expiry
        let me = send(&app, Method::GET, "/api/users/me", Some(&cookie), None).await;
        assert_eq!(me.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn update_requires_current_password_for_new_password() {
        let app = build_app(AppState::fake());
        let (_, cookie) = signup_and_login(&app).await;

        let res = send(
            &app,
            Method::PUT,
            "/api/users/update",
            Some(&cookie),
            Some(json!({ "newPassword": "brand-new" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body["error"], "Current password required");

        let res = send(
            &app,
            Method::PUT,
            "/api/users/update",
            Some(&cookie),
            Some(json!({ "name": "Grace", "currentPassword": "secret1", "newPassword": "brand-new" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["name"], "Grace");
        assert_eq!(res.body["phone"], "+15550000000");
        assert!(res.body["createdAt"].is_string());

        let res = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "brand-new" })),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn deleted_account_token_is_rejected_and_email_reusable() {
        let app = build_app(AppState::fake());
        let (_, cookie) = signup_and_login(&app).await;

        let res = send(&app, Method::DELETE, "/api/users/delete", Some(&cookie), None).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["message"], "Account deleted");
        assert!(res.set_cookie.unwrap().starts_with("jwt=;"));

        let me = send(&app, Method::GET, "/api/users/me", Some(&cookie), None).await;
        assert_eq!(me.status, StatusCode::UNAUTHORIZED);

        signup_and_login(&app).await;
    }

    #[tokio::test]
    async fn foreign_origin_is_forbidden() {
        let app = build_app(AppState::fake());
        let req = axum::http::Request::builder()
            .uri("/api/health")
            .header(ORIGIN, "https://evil.example.com")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = axum::http::Request::builder()
            .uri("/api/health")
            .header(ORIGIN, "https://app.example.com")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );

        let req = axum::http::Request::builder()
            .uri("/api/health")
            .header(ORIGIN, "http://localhost:4321")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn production_cookie_is_secure() {
        let app = build_app(AppState::fake_with(Environment::Production));
        send(
            &app,
            Method::POST,
            "/api/users/signup",
            None,
            Some(json!({"name": "Ada", "email": "a@x.com", "phone": "+1", "password": "secret1"})),
        )
        .await;
        let res = send(
            &app,
            Method::POST,
            "/api/users/login",
            None,
            Some(json!({ "email": "a@x.com", "password": "secret1" })),
        )
        .await;
        let set_cookie = res.set_cookie.unwrap();
        assert!(set_cookie.contains("Secure"));
        assert!(set_cookie.contains("SameSite=None"));
    }
}
