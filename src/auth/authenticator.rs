use actix_web::http::header;
use actix_web::HttpRequest;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::auth::CredentialVerifier;
use crate::db::{Identity, IdentityResolver};
use crate::error::AuthError;
use crate::websocket::Connection;

/// Credentials presented when a client opens its socket.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    token: Option<String>,
}

impl Handshake {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Reads `?token=` first, then falls back to `Authorization: Bearer`.
    pub fn from_request(req: &HttpRequest) -> Self {
        let from_query = url::form_urlencoded::parse(req.query_string().as_bytes())
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned());

        let from_header = || {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
        };

        Self::new(from_query.filter(|t| !t.is_empty()).or_else(from_header))
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Gates every connection attempt on a verified token and a known user.
pub struct ConnectionAuthenticator {
    verifier: Arc<dyn CredentialVerifier>,
    resolver: Arc<dyn IdentityResolver>,
    call_timeout: Duration,
}

impl ConnectionAuthenticator {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        resolver: Arc<dyn IdentityResolver>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            resolver,
            call_timeout,
        }
    }

    /// Returns a connection in the `authenticated` state, or the reason the
    /// attempt is refused. Nothing is registered here.
    pub async fn authenticate(&self, handshake: &Handshake) -> Result<Connection, AuthError> {
        let mut connection = Connection::new();

        match self.resolve_identity(handshake).await {
            Ok(identity) => {
                info!(
                    session_id = %connection.id(),
                    user_id = identity.id,
                    "Socket authenticated: {}",
                    identity.username
                );
                connection.authenticate(identity);
                Ok(connection)
            }
            Err(e) => {
                warn!(
                    session_id = %connection.id(),
                    reason = e.kind(),
                    "Socket handshake rejected: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn resolve_identity(&self, handshake: &Handshake) -> Result<Identity, AuthError> {
        let token = handshake.token().ok_or(AuthError::MissingToken)?;

        let claims = self
            .bounded(self.verifier.verify(token))
            .await?
            .map_err(|e| {
                debug!("Token verification failed: {:#}", e);
                AuthError::InvalidToken
            })?;

        let subject_id = claims.subject_id().ok_or(AuthError::InvalidToken)?;

        self.bounded(self.resolver.fetch(subject_id))
            .await?
            .map_err(|e| {
                error!("Identity lookup for subject {} failed: {:#}", subject_id, e);
                AuthError::Unavailable(e.to_string())
            })?
            .ok_or(AuthError::UnknownUser)
    }

    async fn bounded<T>(&self, call: impl Future<Output = T>) -> Result<T, AuthError> {
        timeout(self.call_timeout, call)
            .await
            .map_err(|_| AuthError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, MockCredentialVerifier};
    use crate::db::MockIdentityResolver;
    use crate::websocket::ConnectionState;
    use actix_web::test::TestRequest;

    const CALL_TIMEOUT: Duration = Duration::from_millis(200);

    fn claims_for(id: Option<i64>) -> Claims {
        Claims { id, iat: 0, exp: i64::MAX }
    }

    fn authenticator(
        verifier: MockCredentialVerifier,
        resolver: MockIdentityResolver,
    ) -> ConnectionAuthenticator {
        ConnectionAuthenticator::new(Arc::new(verifier), Arc::new(resolver), CALL_TIMEOUT)
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_token_never_reaches_verifier() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().never();
        let mut resolver = MockIdentityResolver::new();
        resolver.expect_fetch().never();

        let auth = authenticator(verifier, resolver);
        let result = auth.authenticate(&Handshake::new(None)).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));

        let result = auth.authenticate(&Handshake::new(Some("   ".into()))).await;
        assert!(matches!(result, Err(AuthError::MissingToken)));
    }

    #[tokio::test]
    async fn test_rejected_token_is_invalid() {
        let mut verifier = MockCredentialVerifier::new();
        verifier
            .expect_verify()
            .returning(|_| Err(anyhow::anyhow!("bad signature")));
        let mut resolver = MockIdentityResolver::new();
        resolver.expect_fetch().never();

        let result = authenticator(verifier, resolver)
            .authenticate(&Handshake::new(Some("forged".into())))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_token_without_subject_is_invalid() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().returning(|_| Ok(claims_for(None)));
        let mut resolver = MockIdentityResolver::new();
        resolver.expect_fetch().never();

        let result = authenticator(verifier, resolver)
            .authenticate(&Handshake::new(Some("anonymous".into())))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_unknown_subject_is_refused() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().returning(|_| Ok(claims_for(Some(99))));
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_fetch()
            .withf(|id| *id == 99)
            .times(1)
            .returning(|_| Ok(None));

        let result = authenticator(verifier, resolver)
            .authenticate(&Handshake::new(Some("ghost".into())))
            .await;
        assert!(matches!(result, Err(AuthError::UnknownUser)));
    }

    #[tokio::test]
    async fn test_resolver_failure_is_unavailable() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().returning(|_| Ok(claims_for(Some(7))));
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_fetch()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let result = authenticator(verifier, resolver)
            .authenticate(&Handshake::new(Some("valid".into())))
            .await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_valid_token_yields_authenticated_connection() {
        let mut verifier = MockCredentialVerifier::new();
        verifier
            .expect_verify()
            .withf(|token| token.to_string() == "valid")
            .returning(|_| Ok(claims_for(Some(7))));
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_fetch()
            .returning(|id| Ok(Some(Identity::new(id, "alice"))));

        let connection = authenticator(verifier, resolver)
            .authenticate(&Handshake::new(Some("valid".into())))
            .await
            .expect("handshake should succeed");

        assert_eq!(connection.state(), ConnectionState::Authenticated);
        assert_eq!(connection.identity(), Some(&Identity::new(7, "alice")));
    }

    struct StalledResolver;

    #[async_trait::async_trait]
    impl IdentityResolver for StalledResolver {
        async fn fetch(&self, _subject_id: i64) -> anyhow::Result<Option<Identity>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_resolver_times_out() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().returning(|_| Ok(claims_for(Some(7))));

        let auth = ConnectionAuthenticator::new(
            Arc::new(verifier),
            Arc::new(StalledResolver),
            Duration::from_millis(20),
        );
        let result = auth.authenticate(&Handshake::new(Some("valid".into()))).await;
        assert!(matches!(result, Err(AuthError::Timeout)));
    }

    #[test]
    fn test_handshake_reads_query_token() {
        let req = TestRequest::get().uri("/ws?token=abc.def").to_http_request();
        assert_eq!(Handshake::from_request(&req).token(), Some("abc.def"));
    }

    #[test]
    fn test_handshake_falls_back_to_bearer_header() {
        let req = TestRequest::get()
            .uri("/ws")
            .insert_header((header::AUTHORIZATION, "Bearer xyz"))
            .to_http_request();
        assert_eq!(Handshake::from_request(&req).token(), Some("xyz"));

        let req = TestRequest::get()
            .uri("/ws?token=")
            .insert_header((header::AUTHORIZATION, "Bearer xyz"))
            .to_http_request();
        assert_eq!(Handshake::from_request(&req).token(), Some("xyz"));
    }

    #[test]
    fn test_handshake_without_credentials() {
        let req = TestRequest::get()
            .uri("/ws")
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert_eq!(Handshake::from_request(&req).token(), None);
    }
}
