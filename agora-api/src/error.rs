use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::PollId;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("No authenticated principal")]
    NotAuthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Nothing stored at {0}")]
    NotFound(String),

    #[error("Already voted on poll {0:?}")]
    AlreadyVoted(PollId),

    #[error("Poll has no option {0:?}")]
    UnknownOption(String),

    #[error("Already created the maximum of {limit} polls")]
    TooManyPolls { limit: usize },

    #[error("A poll needs at least 2 options, got {got}")]
    NotEnoughOptions { got: usize },

    #[error("Text must not be empty")]
    EmptyText,

    #[error("Concurrent writes kept overwriting {0}")]
    Conflict(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Invalid Proof of Work")]
    InvalidPow,
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyVoted(_) => StatusCode::CONFLICT,
            Error::UnknownOption(_) => StatusCode::BAD_REQUEST,
            Error::TooManyPolls { .. } => StatusCode::CONFLICT,
            Error::NotEnoughOptions { .. } => StatusCode::BAD_REQUEST,
            Error::EmptyText => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::InvalidPow => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::NotAuthenticated => json!({
                "message": "no authenticated principal",
                "type": "not-authenticated",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::NotFound(path) => json!({
                "message": "nothing stored at path",
                "type": "not-found",
                "path": path,
            }),
            Error::AlreadyVoted(poll) => json!({
                "message": "already voted on this poll",
                "type": "already-voted",
                "poll": poll.0,
            }),
            Error::UnknownOption(opt) => json!({
                "message": "poll has no such option",
                "type": "unknown-option",
                "option": opt,
            }),
            Error::TooManyPolls { limit } => json!({
                "message": "already created the maximum number of polls",
                "type": "too-many-polls",
                "limit": limit,
            }),
            Error::NotEnoughOptions { got } => json!({
                "message": "a poll needs at least 2 options",
                "type": "not-enough-options",
                "got": got,
            }),
            Error::EmptyText => json!({
                "message": "text must not be empty",
                "type": "empty-text",
            }),
            Error::Conflict(path) => json!({
                "message": "concurrent writes kept overwriting this path",
                "type": "conflict",
                "path": path,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a user name",
                "type": "invalid-name",
                "name": n,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": "conflict-uuid",
                "uuid": u,
            }),
            Error::InvalidPow => json!({
                "message": "invalid proof-of-work",
                "type": "invalid-pow",
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let get_str = |field: &str| -> anyhow::Result<String> {
            Ok(String::from(
                data.get(field)
                    .and_then(|f| f.as_str())
                    .ok_or_else(|| anyhow!("error is missing string field {field:?}"))?,
            ))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "not-authenticated" => Error::NotAuthenticated,
                "permission-denied" => Error::PermissionDenied,
                "not-found" => Error::NotFound(get_str("path")?),
                "already-voted" => Error::AlreadyVoted(PollId(
                    data.get("poll")
                        .and_then(|p| p.as_str())
                        .and_then(|p| Uuid::from_str(p).ok())
                        .ok_or_else(|| anyhow!("already-voted error without a poll id"))?,
                )),
                "unknown-option" => Error::UnknownOption(get_str("option")?),
                "too-many-polls" => Error::TooManyPolls {
                    limit: data
                        .get("limit")
                        .and_then(|l| l.as_u64())
                        .ok_or_else(|| anyhow!("too-many-polls error without a limit"))?
                        as usize,
                },
                "not-enough-options" => Error::NotEnoughOptions {
                    got: data
                        .get("got")
                        .and_then(|g| g.as_u64())
                        .ok_or_else(|| anyhow!("not-enough-options error without a count"))?
                        as usize,
                },
                "empty-text" => Error::EmptyText,
                "conflict" => Error::Conflict(get_str("path")?),
                "null-byte" => Error::NullByteInString(get_str("string")?),
                "invalid-name" => Error::InvalidName(get_str("name")?),
                "conflict-name" => Error::NameAlreadyUsed(get_str("name")?),
                "conflict-uuid" => Error::UuidAlreadyUsed(
                    data.get("uuid")
                        .and_then(|uuid| uuid.as_str())
                        .and_then(|uuid| Uuid::from_str(uuid).ok())
                        .ok_or_else(|| anyhow!("error is a uuid conflict without a proper uuid"))?,
                ),
                "invalid-pow" => Error::InvalidPow,
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
