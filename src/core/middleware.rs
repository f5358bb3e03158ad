use crate::auth::FirebaseAuth;
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

/// Appends the signed-in user's ID token as the `auth` query parameter.
///
/// An expired token is refreshed before the request goes out. Requests made
/// while nobody is signed in go out unauthenticated and are judged by the
/// database security rules.
#[derive(Clone)]
pub struct SessionTokenMiddleware {
    auth: FirebaseAuth,
}

impl SessionTokenMiddleware {
    pub fn new(auth: FirebaseAuth) -> Self {
        Self { auth }
    }
}

#[async_trait::async_trait]
impl Middleware for SessionTokenMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let token = self.auth.fresh_id_token().await.map_err(|e| {
            reqwest_middleware::Error::Middleware(anyhow::anyhow!("Failed to get ID token: {}", e))
        })?;

        match token {
            Some(token) => {
                req.url_mut().query_pairs_mut().append_pair("auth", &token);
            }
            None => {
                tracing::debug!("no active session, sending {} unauthenticated", req.url().path());
            }
        }

        next.run(req, extensions).await
    }
}
