use axum::{
    extract::{Path, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json,
};
use upqueue_collab::{PlaybackAction, QueueSnapshot};
use upqueue_core::rank;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{ListStreamsQuery, NewStreamSchema, PlaybackActionSchema, ValidatedJson, VoteSchema},
    serialized::{Playback, Stream, SubmittedStream, ToSerialized, UnvoteResult, VoteResult},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/streams",
    tag = "streams",
    params(ListStreamsQuery),
    security(
        (),
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Stream>, headers(("ETag" = String))),
        (status = 304, description = "The streams haven't changed since the given ETag")
    )
)]
async fn list_streams(
    session: Option<Session>,
    context: ServerContext,
    Query(query): Query<ListStreamsQuery>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let viewer_id = session.map(|s| s.user().id);
    let items = context
        .collab
        .streams
        .list(query.creator_id, viewer_id)
        .await?;

    let items = match query.ranked {
        Some(true) => rank(items),
        _ => items,
    };

    let snapshot = QueueSnapshot::new(items);
    let etag = format!("\"{:x}\"", snapshot.revision);

    let unchanged = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tag| tag.trim() == etag))
        .unwrap_or(false);

    // Hex digits and quotes are always a valid header value
    let etag = HeaderValue::from_str(&etag).unwrap_or(HeaderValue::from_static("\"\""));

    if unchanged {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let streams: Vec<Stream> = snapshot.items.to_serialized();

    Ok(([(header::ETAG, etag)], Json(streams)).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/streams",
    tag = "streams",
    request_body = NewStreamSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SubmittedStream),
        (status = 400, description = "The URL is not a recognized video or track link"),
        (status = 404, description = "The creator doesn't exist"),
        (status = 409, description = "The link is already queued, if duplicates are disallowed")
    )
)]
async fn submit_stream(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<NewStreamSchema>,
) -> ServerResult<Json<SubmittedStream>> {
    let item = context
        .collab
        .streams
        .submit(session.user().id, body.creator_id, &body.url)
        .await?;

    let submitted: SubmittedStream = item.to_serialized();

    Ok(Json(submitted))
}

#[utoipa::path(
    delete,
    path = "/v1/streams/{id}",
    tag = "streams",
    params(
        ("id" = i32, Path, description = "The stream to delete")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "The stream and its votes were deleted"),
        (status = 403, description = "Only the creator can delete a stream"),
        (status = 404, description = "The stream doesn't exist")
    )
)]
async fn delete_stream(
    session: Session,
    context: ServerContext,
    Path(item_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .streams
        .delete(item_id, session.user().id)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/streams/upvote",
    tag = "streams",
    request_body = VoteSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = VoteResult),
        (status = 404, description = "The stream doesn't exist")
    )
)]
async fn upvote(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<VoteResult>> {
    let outcome = context
        .collab
        .streams
        .vote(body.stream_id, session.user().id)
        .await?;

    Ok(Json(outcome.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/streams/downvote",
    tag = "streams",
    request_body = VoteSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = UnvoteResult)
    )
)]
async fn downvote(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<UnvoteResult>> {
    let outcome = context
        .collab
        .streams
        .unvote(body.stream_id, session.user().id)
        .await?;

    Ok(Json(outcome.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/streams/{creatorId}/playback",
    tag = "streams",
    params(
        ("creatorId" = i32, Path, description = "The creator whose playback to show")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Playback),
        (status = 404, description = "The creator doesn't exist")
    )
)]
async fn playback(
    _session: Session,
    context: ServerContext,
    Path(creator_id): Path<i32>,
) -> ServerResult<Json<Playback>> {
    let status = context.collab.streams.playback(creator_id).await?;

    Ok(Json(status.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/streams/{creatorId}/playback",
    tag = "streams",
    params(
        ("creatorId" = i32, Path, description = "The creator whose playback to drive")
    ),
    request_body = PlaybackActionSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Playback),
        (status = 400, description = "Finishing or skipping without an itemId"),
        (status = 403, description = "Only the creator can drive their playback")
    )
)]
async fn control_playback(
    session: Session,
    context: ServerContext,
    Path(creator_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<PlaybackActionSchema>,
) -> ServerResult<Json<Playback>> {
    let action = PlaybackAction::try_from(body)?;

    let status = context
        .collab
        .streams
        .control(creator_id, session.user().id, action)
        .await?;

    Ok(Json(status.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/streams", get(list_streams).post(submit_stream))
        .route("/streams/upvote", post(upvote))
        .route("/streams/downvote", post(downvote))
        .route("/streams/:id", delete(delete_stream))
        .route("/streams/:id/playback", get(playback).post(control_playback))
}
