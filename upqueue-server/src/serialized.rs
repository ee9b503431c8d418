//! All schemas that are exposed from endpoints are defined here
//! along with the From<T> impls

use serde::Serialize;
use upqueue_collab::{
    PlaybackStatus, QueueItemData, SessionData, UnvoteOutcome, UserData, VoteOutcome,
};
use upqueue_core::PlaybackState;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    handle: String,
    provider: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignInResult {
    token: String,
    user: User,
}

/// A queued link, as shown to the viewer
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    id: i32,
    title: String,
    small_image: String,
    large_image: String,
    url: String,
    embed_url: String,
    kind: String,
    vote_count: u32,
    have_upvoted: bool,
    creator_id: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedStream {
    id: i32,
    title: String,
    small_image: String,
    kind: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum VoteResultOutcome {
    Cast,
    AlreadyVoted,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResult {
    outcome: VoteResultOutcome,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum UnvoteResultOutcome {
    Removed,
    NotVoted,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnvoteResult {
    outcome: UnvoteResultOutcome,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStateKind {
    Idle,
    Playing,
    Advancing,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Playback {
    state: PlaybackStateKind,
    current: Option<Stream>,
    history: Vec<Stream>,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            handle: self.handle.clone(),
            provider: self.provider.clone(),
        }
    }
}

impl ToSerialized<SignInResult> for SessionData {
    fn to_serialized(&self) -> SignInResult {
        SignInResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Stream> for QueueItemData {
    fn to_serialized(&self) -> Stream {
        Stream {
            id: self.id,
            title: self.title.clone(),
            small_image: self.small_image.clone(),
            large_image: self.large_image.clone(),
            url: self.url.clone(),
            embed_url: self.embed_url(),
            kind: self.kind.to_string(),
            vote_count: self.vote_count,
            have_upvoted: self.viewer_has_voted,
            creator_id: self.creator_id,
        }
    }
}

impl ToSerialized<SubmittedStream> for QueueItemData {
    fn to_serialized(&self) -> SubmittedStream {
        SubmittedStream {
            id: self.id,
            title: self.title.clone(),
            small_image: self.small_image.clone(),
            kind: self.kind.to_string(),
        }
    }
}

impl ToSerialized<VoteResult> for VoteOutcome {
    fn to_serialized(&self) -> VoteResult {
        let outcome = match self {
            VoteOutcome::Cast => VoteResultOutcome::Cast,
            VoteOutcome::AlreadyVoted => VoteResultOutcome::AlreadyVoted,
        };

        VoteResult { outcome }
    }
}

impl ToSerialized<UnvoteResult> for UnvoteOutcome {
    fn to_serialized(&self) -> UnvoteResult {
        let outcome = match self {
            UnvoteOutcome::Removed => UnvoteResultOutcome::Removed,
            UnvoteOutcome::NotVoted => UnvoteResultOutcome::NotVoted,
        };

        UnvoteResult { outcome }
    }
}

impl ToSerialized<Playback> for PlaybackStatus {
    fn to_serialized(&self) -> Playback {
        let state = match &self.state {
            PlaybackState::Idle => PlaybackStateKind::Idle,
            PlaybackState::Playing { .. } => PlaybackStateKind::Playing,
            PlaybackState::Advancing { .. } => PlaybackStateKind::Advancing,
        };

        Playback {
            state,
            current: self.state.item().map(ToSerialized::<Stream>::to_serialized),
            history: ToSerialized::<Vec<Stream>>::to_serialized(&self.history),
        }
    }
}
