use crate::{Path, StoreEvent};

/// Messages flowing from the store service to feed subscribers over the
/// websocket.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    Change { path: Path, event: StoreEvent },
}
