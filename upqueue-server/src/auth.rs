use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    routing::{get, post},
    Json,
};
use log::warn;
use sha2::{Digest, Sha256};
use upqueue_collab::{SessionData, SignIn, UserData};

use crate::{
    errors::ServerResult,
    schemas::{SignInSchema, ValidatedJson},
    serialized::{SignInResult, ToSerialized, User},
    Router, ServerContext,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> &UserData {
        &self.0.user
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }
}

#[async_trait]
impl FromRequestParts<ServerContext> for Session {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        context: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing authorization"))?;

        let parts: Vec<_> = token.split_ascii_whitespace().collect();

        if parts.first() != Some(&"Bearer") {
            return Err((StatusCode::BAD_REQUEST, "Authorization must be Bearer"));
        }

        let token = parts.last().cloned().unwrap_or_default();

        let session = context
            .collab
            .auth
            .session(token)
            .await
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Session does not exist"))?;

        Ok(Self(session))
    }
}

/// The header the sign-in front end proves itself with
pub const SIGN_IN_SECRET_HEADER: &str = "x-sign-in-secret";

/// Proof that a request comes from the trusted sign-in front end
pub struct SignInGrant;

#[async_trait]
impl FromRequestParts<ServerContext> for SignInGrant {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        context: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = &context.sign_in_secret else {
            warn!("Rejected a sign-in, UPQUEUE_SIGN_IN_SECRET is not configured");
            return Err((StatusCode::UNAUTHORIZED, "Sign-in is disabled"));
        };

        let given = parts
            .headers
            .get(SIGN_IN_SECRET_HEADER)
            .ok_or((StatusCode::UNAUTHORIZED, "Missing sign-in secret"))?;

        // Digests have a fixed length, so comparing them doesn't leak the secret's length
        if Sha256::digest(given.as_bytes()) != Sha256::digest(expected.as_bytes()) {
            return Err((StatusCode::UNAUTHORIZED, "Invalid sign-in secret"));
        }

        Ok(Self)
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-in",
    tag = "auth",
    request_body = SignInSchema,
    params(
        ("x-sign-in-secret" = String, Header, description = "Secret shared with the sign-in front end")
    ),
    responses(
        (status = 200, body = SignInResult),
        (status = 400, description = "The identity is unusable"),
        (status = 401, description = "Missing or wrong sign-in secret")
    )
)]
async fn sign_in(
    _grant: SignInGrant,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<SignInSchema>,
) -> ServerResult<Json<SignInResult>> {
    let session = context
        .collab
        .auth
        .sign_in(SignIn {
            handle: body.handle,
            provider: body.provider,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/auth/sign-out",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The session was deleted")
    )
)]
async fn sign_out(session: Session, context: ServerContext) -> ServerResult<()> {
    context.collab.auth.sign_out(session.token()).await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/v1/auth/user",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 401, description = "Missing or unknown session")
    )
)]
async fn user(session: Session) -> Json<User> {
    Json(session.user().to_serialized())
}

pub fn router() -> Router {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/user", get(user))
}
