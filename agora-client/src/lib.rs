mod chat;
pub use chat::{ChatSyncEngine, TYPING_DEBOUNCE_MS};

mod pending;

mod poll;
pub use poll::PollSyncEngine;

pub mod api {
    pub use agora_api::*;
}

use api::Error;

/// Compound read-compute-swap operations retry this many times before
/// reporting a conflict.
pub const MAX_CAS_ATTEMPTS: usize = 5;

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|err| Error::Unknown(format!("encoding record: {err}")))
}

pub(crate) fn decode<T: for<'de> serde::Deserialize<'de>>(
    value: serde_json::Value,
) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|err| Error::Unknown(format!("decoding record: {err}")))
}
