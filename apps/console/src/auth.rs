use client_core::{GatewayError, RequestAuthorizer};
use reqwest::{header::AUTHORIZATION, RequestBuilder, Url};

/// Attaches the session token to outgoing requests. The users service expects
/// a `Bearer` scheme; the groups, things and channels services take the raw
/// token.
pub struct TokenAuthorizer {
    token: Option<String>,
    users_prefix: String,
    bypass_prefixes: Vec<String>,
}

impl TokenAuthorizer {
    pub fn new(token: Option<String>, users_url: &str, bypass_prefixes: Vec<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            users_prefix: users_url.trim_end_matches('/').to_string(),
            bypass_prefixes,
        }
    }

    fn bypassed(&self, url: &str) -> bool {
        is_bypassed(url, &self.bypass_prefixes)
    }
}

impl RequestAuthorizer for TokenAuthorizer {
    fn authorize(&self, url: &Url, request: RequestBuilder) -> RequestBuilder {
        let Some(token) = self.token.as_deref() else {
            return request;
        };
        if self.bypassed(url.as_str()) {
            return request;
        }
        if url.as_str().starts_with(&self.users_prefix) {
            request.header(AUTHORIZATION, format!("Bearer {token}"))
        } else {
            request.header(AUTHORIZATION, token)
        }
    }
}

fn is_bypassed(url: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
}

/// 401 and 403 answers from non-bypassed services mean the token is no longer
/// accepted.
pub fn session_expired(err: &GatewayError, bypass_prefixes: &[String]) -> bool {
    err.code().is_some_and(|code| code.is_auth()) && !is_bypassed(err.url(), bypass_prefixes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(authorizer: &TokenAuthorizer, url: &str) -> Option<String> {
        let url = Url::parse(url).expect("url");
        let request = authorizer
            .authorize(&url, reqwest::Client::new().get(url.clone()))
            .build()
            .expect("request");
        request
            .headers()
            .get(AUTHORIZATION)
            .map(|value| value.to_str().expect("ascii header").to_string())
    }

    fn authorizer() -> TokenAuthorizer {
        TokenAuthorizer::new(
            Some("tok".to_string()),
            "http://svc.local/users/",
            vec!["http://svc.local/groups/public".to_string()],
        )
    }

    #[test]
    fn users_service_gets_bearer_scheme() {
        assert_eq!(
            header_for(&authorizer(), "http://svc.local/users?offset=0").as_deref(),
            Some("Bearer tok")
        );
    }

    #[test]
    fn other_services_get_raw_token() {
        let auth = authorizer();
        assert_eq!(header_for(&auth, "http://svc.local/things").as_deref(), Some("tok"));
        assert_eq!(header_for(&auth, "http://svc.local/groups/g1").as_deref(), Some("tok"));
    }

    #[test]
    fn bypassed_prefix_is_left_alone() {
        assert_eq!(header_for(&authorizer(), "http://svc.local/groups/public/g1"), None);
    }

    #[test]
    fn blank_token_sends_nothing() {
        let auth = TokenAuthorizer::new(Some("  ".to_string()), "http://svc.local/users", vec![]);
        assert_eq!(header_for(&auth, "http://svc.local/users"), None);
    }

    #[test]
    fn auth_failures_mark_session_expired() {
        let bypass = vec!["http://svc.local/groups/public".to_string()];

        let forbidden = GatewayError::status("http://svc.local/groups/g1", 403, "Forbidden");
        assert!(session_expired(&forbidden, &bypass));

        let unauthorized = GatewayError::status("http://svc.local/users", 401, "Unauthorized");
        assert!(session_expired(&unauthorized, &bypass));

        let public = GatewayError::status("http://svc.local/groups/public/g1", 401, "Unauthorized");
        assert!(!session_expired(&public, &bypass));

        let missing = GatewayError::status("http://svc.local/groups/g1", 404, "Not Found");
        assert!(!session_expired(&missing, &bypass));
    }
}
