use crate::AppState;
use crate::utils::auth::validate_session_token;
use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

const SESSION_COOKIE: &str = "session";

#[derive(Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

/// Session token from the bearer header, the session cookie or the `token` query
/// parameter, in that order.
fn session_token(req: &Request) -> Option<String> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string());
    if bearer.is_some() {
        return bearer;
    }

    let cookie = req
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());
    if cookie.is_some() {
        return cookie;
    }

    let query = req.uri().query().unwrap_or_default();
    serde_urlencoded::from_str::<AuthQuery>(query)
        .ok()
        .and_then(|q| q.token)
}

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(token) = session_token(&req) else {
        tracing::debug!("Missing session for {} {}", req.method(), req.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    };

    match validate_session_token(&token, &state.config.session_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(e) => {
            tracing::warn!("Rejected session token: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
