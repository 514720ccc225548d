use std::{collections::HashMap, sync::Arc};

use agora_api::{FeedMessage, Uuid};
use axum::extract::ws::Message;
use futures::{channel::mpsc, select, SinkExt, StreamExt};
use tokio::sync::RwLock;

use crate::store::Change;

/// The connected change-feed sockets. Every store mutation is broadcast
/// to all of them; a socket that fails a send is pruned.
#[derive(Clone)]
pub struct ChangeFeeds(Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<FeedMessage>>>>);

impl ChangeFeeds {
    pub fn new() -> ChangeFeeds {
        ChangeFeeds(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn num_sockets(&self) -> usize {
        self.0.read().await.len()
    }

    pub async fn add_socket<W, R>(self, mut write: W, read: R)
    where
        W: 'static + Send + Unpin + futures::Sink<Message>,
        <W as futures::Sink<Message>>::Error: Send,
        R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
    {
        // Note: if this were bounded, there would be a deadlock between the
        // write-lock to remove a channel and the read-lock to broadcast
        let (sender, mut receiver) = mpsc::unbounded();
        let sender_id = Uuid::new_v4();

        self.0.write().await.insert(sender_id, sender);

        let this = self.clone();
        let mut read = read.fuse();
        tokio::spawn(async move {
            macro_rules! remove_self {
                () => {{
                    this.0.write().await.remove(&sender_id);
                    return;
                }};
            }
            macro_rules! send_message {
                ( $msg:expr ) => {{
                    let msg: FeedMessage = $msg;
                    let json = match serde_json::to_vec(&msg) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::error!(?err, ?msg, "failed serializing message to json");
                            continue;
                        }
                    };
                    if let Err(_) = write.send(Message::Binary(json)).await {
                        remove_self!();
                    }
                }};
            }
            loop {
                select! {
                    msg = receiver.next() => match msg {
                        None => remove_self!(),
                        Some(msg) => send_message!(msg),
                    },
                    msg = read.next() => match msg {
                        None => remove_self!(),
                        Some(Ok(Message::Close(_))) => remove_self!(),
                        Some(Ok(Message::Text(msg))) => {
                            if msg != "ping" {
                                tracing::warn!("received unexpected message from client: {msg:?}");
                                remove_self!();
                            }
                            send_message!(FeedMessage::Pong);
                        }
                        Some(msg) => {
                            tracing::warn!("received unexpected message from client: {msg:?}");
                            remove_self!();
                        }
                    },
                }
            }
        });
    }

    pub async fn relay(&self, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        let feeds = self.0.read().await;
        for change in changes {
            let msg = FeedMessage::Change {
                path: change.path,
                event: change.event,
            };
            for sock in feeds.values() {
                // closed sockets are pruned by their own relay task
                let _ = sock.unbounded_send(msg.clone());
            }
        }
    }
}
