use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth, schemas, serialized, streams};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::sign_in,
        auth::sign_out,
        auth::user,
        streams::list_streams,
        streams::submit_stream,
        streams::delete_stream,
        streams::upvote,
        streams::downvote,
        streams::playback,
        streams::control_playback,
    ),
    components(schemas(
        schemas::SignInSchema,
        schemas::NewStreamSchema,
        schemas::VoteSchema,
        schemas::PlaybackActionKind,
        schemas::PlaybackActionSchema,
        serialized::User,
        serialized::SignInResult,
        serialized::Stream,
        serialized::SubmittedStream,
        serialized::VoteResultOutcome,
        serialized::VoteResult,
        serialized::UnvoteResultOutcome,
        serialized::UnvoteResult,
        serialized::PlaybackStateKind,
        serialized::Playback,
    )),
    modifiers(&Security),
    info(
        title = "upqueue API",
        description = "upqueue-server exposes endpoints to queue links to a creator's stream and vote on them"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
