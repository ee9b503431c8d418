use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use upqueue_collab::PlaybackAction;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignInSchema {
    /// The handle proven by the identity provider, such as an email address
    #[validate(length(min = 1, max = 320))]
    pub handle: String,
    #[validate(length(min = 1, max = 64))]
    pub provider: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewStreamSchema {
    pub creator_id: i32,
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteSchema {
    pub stream_id: i32,
}

#[derive(Debug, Clone, Copy, ToSchema, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackActionKind {
    Sync,
    Finish,
    Skip,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlaybackActionSchema {
    pub action: PlaybackActionKind,
    /// The stream the playback surface is showing, required to finish or skip
    pub item_id: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListStreamsQuery {
    /// Only list the streams queued for this creator
    pub creator_id: Option<i32>,
    /// Order by votes instead of submission
    pub ranked: Option<bool>,
}

impl TryFrom<PlaybackActionSchema> for PlaybackAction {
    type Error = ServerError;

    fn try_from(value: PlaybackActionSchema) -> Result<Self, Self::Error> {
        let item_id = || {
            value
                .item_id
                .ok_or_else(|| ServerError::Validation("itemId is required".to_string()))
        };

        match value.action {
            PlaybackActionKind::Sync => Ok(PlaybackAction::Sync),
            PlaybackActionKind::Finish => Ok(PlaybackAction::Finish { item_id: item_id()? }),
            PlaybackActionKind::Skip => Ok(PlaybackAction::Skip { item_id: item_id()? }),
        }
    }
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
