//! Route protection for browser page requests.
//!
//! Page paths never answer 401/403; a request that may not proceed is
//! redirected instead. Each request is judged on its own token alone.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use url::form_urlencoded;
use tracing::debug;

use crate::{
    auth::JwtService,
    handlers::AppState,
    middleware::auth::{cookie_value, AUTH_COOKIE},
};

#[derive(Debug, Clone)]
pub struct GatePolicy {
    pub protected_prefixes: Vec<String>,
    pub admin_prefixes: Vec<String>,
    pub login_path: String,
    pub user_landing: String,
    pub admin_landing: String,
}

impl Default for GatePolicy {
    fn default() -> Self {
        let owned = |paths: &[&str]| -> Vec<String> { paths.iter().map(|p| p.to_string()).collect() };
        Self {
            protected_prefixes: owned(&[
                "/dashboard",
                "/readings",
                "/appointments",
                "/profile",
                "/health-companion",
                "/billing",
                "/admin",
            ]),
            admin_prefixes: owned(&["/admin"]),
            login_path: "/login".to_string(),
            user_landing: "/dashboard".to_string(),
            admin_landing: "/admin/dashboard".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Redirect(String),
}

/// True for `prefix` itself and anything below it, but not `/dashboardx`.
fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with('/'))
}

impl GatePolicy {
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| under(path, prefix))
    }

    pub fn requires_admin(&self, path: &str) -> bool {
        self.admin_prefixes.iter().any(|prefix| under(path, prefix))
    }

    fn login_redirect(&self, path: &str) -> GateDecision {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("callbackUrl", path)
            .finish();
        GateDecision::Redirect(format!("{}?{}", self.login_path, query))
    }

    pub fn evaluate(&self, path: &str, token: Option<&str>, jwt: &JwtService) -> GateDecision {
        if !self.is_protected(path) {
            return GateDecision::Allowed;
        }

        let Some(token) = token else {
            return self.login_redirect(path);
        };
        let claims = match jwt.verify_token(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Rejected page token for {}: {}", path, e);
                return self.login_redirect(path);
            }
        };

        if claims.role.is_admin() {
            if path == self.user_landing {
                return GateDecision::Redirect(self.admin_landing.clone());
            }
        } else if self.requires_admin(path) {
            return GateDecision::Redirect(self.user_landing.clone());
        }

        GateDecision::Allowed
    }
}

pub async fn access_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let token = cookie_value(request.headers(), AUTH_COOKIE);

    match state.gate.evaluate(&path, token, &state.jwt) {
        GateDecision::Allowed => next.run(request).await,
        GateDecision::Redirect(location) => Redirect::temporary(&location).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use uuid::Uuid;

    fn jwt() -> JwtService {
        JwtService::new("gate-secret", 24)
    }

    fn token(role: Role) -> String {
        jwt().generate_token(Uuid::new_v4(), "p@example.com", role).unwrap()
    }

    #[test]
    fn test_public_paths_need_no_token() {
        let policy = GatePolicy::default();
        for path in ["/", "/login", "/pricing", "/dashboardx", "/assets/app.js"] {
            assert_eq!(policy.evaluate(path, None, &jwt()), GateDecision::Allowed, "{}", path);
        }
    }

    #[test]
    fn test_missing_or_bad_token_goes_to_login_with_callback() {
        let policy = GatePolicy::default();
        let expected = GateDecision::Redirect("/login?callbackUrl=%2Freadings%2Fnew".to_string());

        assert_eq!(policy.evaluate("/readings/new", None, &jwt()), expected);
        assert_eq!(policy.evaluate("/readings/new", Some("garbage"), &jwt()), expected);

        let foreign = JwtService::new("other", 24)
            .generate_token(Uuid::new_v4(), "p@example.com", Role::User)
            .unwrap();
        assert_eq!(policy.evaluate("/readings/new", Some(&foreign), &jwt()), expected);
    }

    #[test]
    fn test_callback_is_form_encoded() {
        let policy = GatePolicy::default();
        assert_eq!(
            policy.evaluate("/profile/edit me&now", None, &jwt()),
            GateDecision::Redirect("/login?callbackUrl=%2Fprofile%2Fedit+me%26now".to_string())
        );
    }

    #[test]
    fn test_expired_token_goes_to_login() {
        let policy = GatePolicy::default();
        let expired = JwtService::new("gate-secret", -1)
            .generate_token(Uuid::new_v4(), "p@example.com", Role::User)
            .unwrap();

        assert!(matches!(
            policy.evaluate("/profile", Some(&expired), &jwt()),
            GateDecision::Redirect(location) if location.starts_with("/login?")
        ));
    }

    #[test]
    fn test_user_on_admin_path_goes_to_dashboard() {
        let policy = GatePolicy::default();
        let user = token(Role::User);

        assert_eq!(
            policy.evaluate("/admin/readings", Some(&user), &jwt()),
            GateDecision::Redirect("/dashboard".to_string())
        );
        assert_eq!(policy.evaluate("/dashboard", Some(&user), &jwt()), GateDecision::Allowed);
    }

    #[test]
    fn test_admin_landing_is_normalized() {
        let policy = GatePolicy::default();
        let admin = token(Role::Admin);

        assert_eq!(
            policy.evaluate("/dashboard", Some(&admin), &jwt()),
            GateDecision::Redirect("/admin/dashboard".to_string())
        );
        assert_eq!(policy.evaluate("/admin/dashboard", Some(&admin), &jwt()), GateDecision::Allowed);
        assert_eq!(policy.evaluate("/readings", Some(&admin), &jwt()), GateDecision::Allowed);
    }
}
