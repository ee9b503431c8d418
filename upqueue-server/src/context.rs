use std::{convert::Infallible, sync::Arc};

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use upqueue_collab::Collab;

#[derive(Clone)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
    /// Shared with the sign-in front end. Without it, nobody can sign in
    pub sign_in_secret: Option<Arc<str>>,
}

impl ServerContext {
    pub fn new(collab: Collab, sign_in_secret: Option<String>) -> Self {
        Self {
            collab: Arc::new(collab),
            sign_in_secret: sign_in_secret.map(Into::into),
        }
    }
}

/// Lets handlers take the context directly
#[async_trait]
impl FromRequestParts<ServerContext> for ServerContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.clone())
    }
}
