use std::{cmp, collections::HashMap, str::FromStr, sync::Arc};

use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    api::{
        DeliveryState, Error, IdentityProvider, Message, MessageId, Path, RemoteStore, StoreEvent,
        Subscription,
    },
    pending::{PendingOp, PendingOps},
    MAX_CAS_ATTEMPTS,
};

/// How long callers should wait after the last keystroke before clearing
/// the typing flag. The engine itself does not debounce: it exposes raw
/// `set_typing` writes and clears the flag on send.
pub const TYPING_DEBOUNCE_MS: u64 = 1500;

/// Client-side synchronization engine for the chat room: owns the local
/// message list, reaction state, typing and presence maps, and mediates
/// every read and write on the `messages`, `typing` and `userStatus`
/// paths. The local state is a cache kept live by subscriptions, never
/// authoritative; mutations apply optimistically and reconcile against
/// the echoed store events.
pub struct ChatSyncEngine {
    store: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,

    messages: Vec<Message>,
    typing: HashMap<String, bool>,
    presence: HashMap<String, bool>,
    pending: PendingOps,

    messages_sub: Subscription,
    typing_sub: Subscription,
    status_sub: Subscription,
}

enum NextEvent {
    Message(StoreEvent),
    Typing(StoreEvent),
    Status(StoreEvent),
    Closed,
}

impl ChatSyncEngine {
    /// Attaches the three chat subscriptions and announces the current
    /// principal as online.
    pub async fn start(
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<ChatSyncEngine, Error> {
        let messages_sub = store.subscribe_children(&Path::messages()).await?;
        let typing_sub = store.subscribe_value(&Path::typing()).await?;
        let status_sub = store.subscribe_value(&Path::user_status()).await?;
        if let Some(me) = identity.current_principal() {
            store
                .write(&Path::user_status_user(&me.name), Value::Bool(true))
                .await?;
        }
        Ok(ChatSyncEngine {
            store,
            identity,
            messages: Vec::new(),
            typing: HashMap::new(),
            presence: HashMap::new(),
            pending: PendingOps::new(),
            messages_sub,
            typing_sub,
            status_sub,
        })
    }

    /// Detaches all listeners (messages, then typing, then presence) and
    /// writes the final offline presence, best-effort.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        self.messages_sub.cancel();
        self.typing_sub.cancel();
        self.status_sub.cancel();
        if let Some(me) = self.identity.current_principal() {
            self.store
                .write(&Path::user_status_user(&me.name), Value::Bool(false))
                .await?;
        }
        Ok(())
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Usernames currently typing, excluding the current principal.
    pub fn typing_users(&self) -> Vec<&str> {
        let me = self.identity.current_principal();
        self.typing
            .iter()
            .filter(|(user, &is_typing)| {
                is_typing && me.as_ref().map(|m| m.name != **user).unwrap_or(true)
            })
            .map(|(user, _)| user.as_str())
            .collect()
    }

    pub fn presence(&self) -> &HashMap<String, bool> {
        &self.presence
    }

    pub fn pending_ops(&self) -> usize {
        self.pending.len()
    }

    /// Sends a new message: optimistic local append, then the store
    /// write; the local copy is rolled back if the write fails. Also
    /// clears the sender's typing flag.
    pub async fn send_message(
        &mut self,
        text: String,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, Error> {
        agora_api::validate_string(&text)?;
        let me = self
            .identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;

        let msg = Message::now(me.name.clone(), text, reply_to);
        let id = msg.id;
        self.messages.push(msg.clone());
        self.pending.push(PendingOp::Send { id });

        if let Err(err) = self.store.remove(&Path::typing_user(&me.name)).await {
            tracing::warn!(?err, "failed clearing typing flag on send");
        }

        match self.store.write(&Path::message(id), crate::encode(&msg)?).await {
            Ok(()) => Ok(id),
            Err(err) => {
                self.rollback_matching(|op| matches!(op, PendingOp::Send { id: i } if *i == id));
                Err(err)
            }
        }
    }

    /// Overwrites the text and refreshes the timestamp. The engine does
    /// not check that the editor is the original author; that guard lives
    /// in the UI only.
    pub async fn edit_message(&mut self, id: MessageId, new_text: String) -> Result<(), Error> {
        agora_api::validate_string(&new_text)?;
        let (updated, prev_text, prev_created_at) = {
            let msg = self
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| Error::NotFound(Path::message(id).to_string()))?;
            let prev_text = std::mem::replace(&mut msg.text, new_text);
            let prev_created_at = msg.created_at;
            msg.created_at = Utc::now();
            (msg.clone(), prev_text, prev_created_at)
        };
        self.pending.push(PendingOp::Edit {
            id,
            prev_text,
            prev_created_at,
        });

        match self
            .store
            .write(&Path::message(id), crate::encode(&updated)?)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                self.rollback_matching(|op| matches!(op, PendingOp::Edit { id: i, .. } if *i == id));
                Err(err)
            }
        }
    }

    /// Destructive removal by id, no ownership check at this level.
    pub async fn delete_message(&mut self, id: MessageId) -> Result<(), Error> {
        let index = self
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::NotFound(Path::message(id).to_string()))?;
        let message = self.messages.remove(index);
        self.pending.push(PendingOp::Delete { id, index, message });

        match self.store.remove(&Path::message(id)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.rollback_matching(
                    |op| matches!(op, PendingOp::Delete { id: i, .. } if *i == id),
                );
                Err(err)
            }
        }
    }

    /// Toggles the (emoji, current user) reaction pair, through a
    /// compare-and-swap loop so that two users reacting at the same time
    /// cannot overwrite each other.
    pub async fn add_reaction(&mut self, id: MessageId, emoji: &str) -> Result<(), Error> {
        let me = self
            .identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        {
            let msg = self
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| Error::NotFound(Path::message(id).to_string()))?;
            msg.toggle_reaction(emoji, &me.name);
        }
        self.pending.push(PendingOp::React {
            id,
            emoji: String::from(emoji),
            user: me.name.clone(),
        });

        let path = Path::message(id);
        let res = self.toggle_reaction_remote(&path, emoji, &me.name).await;
        if res.is_err() {
            self.rollback_matching(|op| matches!(op, PendingOp::React { id: i, .. } if *i == id));
        }
        res
    }

    async fn toggle_reaction_remote(
        &mut self,
        path: &Path,
        emoji: &str,
        user: &str,
    ) -> Result<(), Error> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .read(path)
                .await?
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            let mut msg: Message = crate::decode(current.clone())?;
            msg.toggle_reaction(emoji, user);
            if self
                .store
                .compare_and_swap(path, Some(current), Some(crate::encode(&msg)?))
                .await?
            {
                return Ok(());
            }
        }
        Err(Error::Conflict(path.to_string()))
    }

    /// Raw typing flag write; callers debounce (see
    /// [`TYPING_DEBOUNCE_MS`]) and the engine clears the flag on send.
    pub async fn set_typing(&mut self, is_typing: bool) -> Result<(), Error> {
        let me = self
            .identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        let path = Path::typing_user(&me.name);
        match is_typing {
            true => self.store.write(&path, Value::Bool(true)).await,
            false => self.store.remove(&path).await,
        }
    }

    /// Receiving-client acknowledgment: advances another author's message
    /// to `Seen`. A client never advances its own messages.
    pub async fn mark_seen(&mut self, id: MessageId) -> Result<(), Error> {
        self.advance_delivery(id, DeliveryState::Seen).await
    }

    async fn advance_delivery(&mut self, id: MessageId, target: DeliveryState) -> Result<(), Error> {
        let me = self
            .identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        {
            let msg = self
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| Error::NotFound(Path::message(id).to_string()))?;
            if msg.author == me.name {
                return Ok(());
            }
            msg.status.advance_to(target);
        }

        let path = Path::message(id);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .read(&path)
                .await?
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            let mut msg: Message = crate::decode(current.clone())?;
            if !msg.status.advance_to(target) {
                return Ok(());
            }
            if self
                .store
                .compare_and_swap(&path, Some(current), Some(crate::encode(&msg)?))
                .await?
            {
                return Ok(());
            }
        }
        Err(Error::Conflict(path.to_string()))
    }

    /// Applies every event already delivered by the subscriptions.
    /// Returns how many were applied.
    pub async fn pump(&mut self) -> usize {
        let mut applied = 0;
        loop {
            if let Some(e) = self.messages_sub.try_recv() {
                self.apply_message_event(e).await;
            } else if let Some(e) = self.typing_sub.try_recv() {
                self.apply_typing_event(e);
            } else if let Some(e) = self.status_sub.try_recv() {
                self.apply_status_event(e);
            } else {
                return applied;
            }
            applied += 1;
        }
    }

    /// Waits for and applies the next event from any subscription.
    /// Returns false once all subscriptions are closed.
    pub async fn process_one(&mut self) -> bool {
        let next = futures::select! {
            e = self.messages_sub.select_next_some() => NextEvent::Message(e),
            e = self.typing_sub.select_next_some() => NextEvent::Typing(e),
            e = self.status_sub.select_next_some() => NextEvent::Status(e),
            complete => NextEvent::Closed,
        };
        match next {
            NextEvent::Message(e) => self.apply_message_event(e).await,
            NextEvent::Typing(e) => self.apply_typing_event(e),
            NextEvent::Status(e) => self.apply_status_event(e),
            NextEvent::Closed => return false,
        }
        true
    }

    async fn apply_message_event(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::ChildAdded { key, value } | StoreEvent::ChildChanged { key, value } => {
                let incoming: Message = match crate::decode(value) {
                    Ok(m) => m,
                    Err(err) => {
                        tracing::warn!(?err, %key, "dropping unparseable message snapshot");
                        return;
                    }
                };
                let authoritative_status = incoming.status;
                let id = incoming.id;
                self.reconcile_message(incoming);
                self.pending.retire(|op| op.message_id() == id);

                // acknowledge other authors' fresh messages as delivered
                let me = self.identity.current_principal();
                let should_ack = me
                    .map(|me| {
                        authoritative_status == DeliveryState::Sent
                            && self
                                .message(id)
                                .map(|m| m.author != me.name)
                                .unwrap_or(false)
                    })
                    .unwrap_or(false);
                if should_ack {
                    if let Err(err) = self.advance_delivery(id, DeliveryState::Delivered).await {
                        tracing::warn!(?err, ?id, "failed acknowledging delivery");
                    }
                }
            }
            StoreEvent::ChildRemoved { key } => {
                match Uuid::from_str(&key) {
                    Ok(id) => {
                        let id = MessageId(id);
                        self.messages.retain(|m| m.id != id);
                        self.pending.retire(|op| op.message_id() == id);
                    }
                    Err(_) => tracing::warn!(%key, "removal event for non-uuid message key"),
                };
            }
            StoreEvent::ValueChanged { .. } => {
                tracing::warn!("unexpected value snapshot on the messages child subscription")
            }
        }
    }

    /// Replaces the local copy with the authoritative one. Delivery state
    /// merges monotonically: an echo carrying a stale status never
    /// regresses a local advance. Unknown ids are appended in arrival
    /// order, which also covers a ChildChanged overtaking its ChildAdded.
    fn reconcile_message(&mut self, mut incoming: Message) {
        match self.messages.iter_mut().find(|m| m.id == incoming.id) {
            Some(local) => {
                incoming.status = cmp::max(incoming.status, local.status);
                *local = incoming;
            }
            None => self.messages.push(incoming),
        }
    }

    fn apply_typing_event(&mut self, event: StoreEvent) {
        if let Some(map) = snapshot_map(event, "typing") {
            self.typing = map;
        }
    }

    fn apply_status_event(&mut self, event: StoreEvent) {
        if let Some(map) = snapshot_map(event, "userStatus") {
            self.presence = map;
        }
    }

    fn rollback_matching(&mut self, pred: impl Fn(&PendingOp) -> bool) {
        let Some(op) = self.pending.retire(pred) else {
            return;
        };
        match op {
            PendingOp::Send { id } => self.messages.retain(|m| m.id != id),
            PendingOp::Edit {
                id,
                prev_text,
                prev_created_at,
            } => {
                if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
                    msg.text = prev_text;
                    msg.created_at = prev_created_at;
                }
            }
            PendingOp::Delete { index, message, .. } => {
                let index = cmp::min(index, self.messages.len());
                self.messages.insert(index, message);
            }
            PendingOp::React { id, emoji, user } => {
                if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
                    msg.toggle_reaction(&emoji, &user);
                }
            }
        }
    }
}

fn snapshot_map(event: StoreEvent, path: &str) -> Option<HashMap<String, bool>> {
    match event {
        StoreEvent::ValueChanged { value: Value::Null } => Some(HashMap::new()),
        StoreEvent::ValueChanged { value } => match serde_json::from_value(value) {
            Ok(map) => Some(map),
            Err(err) => {
                tracing::warn!(?err, path, "dropping unparseable flag snapshot");
                None
            }
        },
        _ => {
            tracing::warn!(path, "unexpected child event on a value subscription");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_mock_server::MockServer;
    use async_trait::async_trait;

    async fn engine_for(server: &MockServer, name: &str) -> ChatSyncEngine {
        server.create_user(name).expect("creating user");
        let session = server.log_in(name).expect("logging in");
        let mut engine = ChatSyncEngine::start(Arc::new(server.clone()), Arc::new(session))
            .await
            .expect("starting engine");
        engine.pump().await;
        engine
    }

    #[tokio::test]
    async fn send_fans_out_to_other_subscribed_client() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice
            .send_message(String::from("hello"), None)
            .await
            .expect("sending");

        // bob observes the message without issuing any request
        bob.pump().await;
        let received = bob.message(id).expect("bob received the message");
        assert_eq!(received.author, "alice");
        assert_eq!(received.text, "hello");
        assert_eq!(received.reply_to, None);

        // bob's engine acknowledged it, so both sides converge on Delivered
        alice.pump().await;
        bob.pump().await;
        assert_eq!(alice.message(id).unwrap().status, DeliveryState::Delivered);
        assert_eq!(bob.message(id).unwrap().status, DeliveryState::Delivered);
    }

    #[tokio::test]
    async fn reply_to_round_trips() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let first = alice
            .send_message(String::from("hello"), None)
            .await
            .unwrap();
        bob.pump().await;
        let reply = bob
            .send_message(String::from("hi!"), Some(first))
            .await
            .unwrap();

        alice.pump().await;
        assert_eq!(alice.message(reply).unwrap().reply_to, Some(first));
    }

    #[tokio::test]
    async fn send_requires_a_principal_and_nonempty_text() {
        let server = MockServer::new();
        server.create_user("alice").unwrap();
        let mut anon = ChatSyncEngine::start(
            Arc::new(server.clone()),
            Arc::new(server.signed_out()),
        )
        .await
        .unwrap();
        assert_eq!(
            anon.send_message(String::from("hello"), None).await,
            Err(Error::NotAuthenticated),
        );
        assert!(anon.messages().is_empty());

        let mut alice = engine_for(&server, "alice2").await;
        assert_eq!(
            alice.send_message(String::from("   "), None).await,
            Err(Error::EmptyText),
        );
    }

    #[tokio::test]
    async fn edit_overwrites_text_and_refreshes_timestamp() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice
            .send_message(String::from("helo"), None)
            .await
            .unwrap();
        let created = alice.message(id).unwrap().created_at;
        alice
            .edit_message(id, String::from("hello"))
            .await
            .expect("editing");

        bob.pump().await;
        let seen = bob.message(id).expect("bob has the edit");
        assert_eq!(seen.text, "hello");
        assert!(seen.created_at >= created);
    }

    #[tokio::test]
    async fn delete_is_destructive_for_everyone() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice.send_message(String::from("oops"), None).await.unwrap();
        bob.pump().await;
        assert!(bob.message(id).is_some());

        alice.delete_message(id).await.expect("deleting");
        bob.pump().await;
        alice.pump().await;
        assert!(bob.message(id).is_none());
        assert!(alice.message(id).is_none());
    }

    #[tokio::test]
    async fn reaction_toggled_twice_restores_original_set() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice.send_message(String::from("hey"), None).await.unwrap();
        bob.pump().await;

        bob.add_reaction(id, "🎉").await.expect("first toggle");
        bob.pump().await;
        assert!(bob.message(id).unwrap().has_reaction("🎉", "bob"));

        bob.add_reaction(id, "🎉").await.expect("second toggle");
        bob.pump().await;
        alice.pump().await;
        assert!(bob.message(id).unwrap().reactions.is_empty());
        assert!(alice.message(id).unwrap().reactions.is_empty());
    }

    #[tokio::test]
    async fn concurrent_reactions_from_two_users_both_land() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;
        let mut carol = engine_for(&server, "carol").await;

        let id = alice.send_message(String::from("hey"), None).await.unwrap();
        bob.pump().await;
        carol.pump().await;

        let (rb, rc) = futures::join!(bob.add_reaction(id, "👍"), carol.add_reaction(id, "❤"));
        rb.expect("bob's reaction");
        rc.expect("carol's reaction");

        alice.pump().await;
        let msg = alice.message(id).unwrap();
        assert!(msg.has_reaction("👍", "bob"));
        assert!(msg.has_reaction("❤", "carol"));
    }

    #[tokio::test]
    async fn delivery_state_survives_stale_snapshots() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice.send_message(String::from("hello"), None).await.unwrap();
        bob.pump().await;
        bob.mark_seen(id).await.expect("marking seen");
        assert_eq!(bob.message(id).unwrap().status, DeliveryState::Seen);

        // a stale snapshot echoed late must not regress the local state
        let mut stale = bob.message(id).unwrap().clone();
        stale.status = DeliveryState::Sent;
        bob.reconcile_message(stale);
        assert_eq!(bob.message(id).unwrap().status, DeliveryState::Seen);
    }

    #[tokio::test]
    async fn own_messages_are_never_acknowledged_by_their_author() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let id = alice.send_message(String::from("hi"), None).await.unwrap();
        alice.pump().await;
        alice.mark_seen(id).await.expect("no-op for own message");
        assert_eq!(alice.message(id).unwrap().status, DeliveryState::Sent);
    }

    #[tokio::test]
    async fn typing_flag_is_visible_to_others_and_cleared_on_send() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        alice.set_typing(true).await.expect("setting typing");
        bob.pump().await;
        assert_eq!(bob.typing_users(), vec!["alice"]);
        // one's own flag is filtered out
        alice.pump().await;
        assert!(alice.typing_users().is_empty());

        alice
            .send_message(String::from("done typing"), None)
            .await
            .unwrap();
        bob.pump().await;
        assert!(bob.typing_users().is_empty());
    }

    #[tokio::test]
    async fn presence_follows_engine_lifecycle() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;
        alice.pump().await;
        assert_eq!(alice.presence().get("bob"), Some(&true));

        bob.shutdown().await.expect("shutting down");
        alice.pump().await;
        assert_eq!(alice.presence().get("bob"), Some(&false));
    }

    #[tokio::test]
    async fn shutdown_detaches_every_listener() {
        let server = MockServer::new();
        let alice = engine_for(&server, "alice").await;
        assert_eq!(server.test_num_subscribers(), 3);
        alice.shutdown().await.unwrap();
        assert_eq!(server.test_num_subscribers(), 0);
    }

    #[tokio::test]
    async fn sign_out_takes_effect_on_the_next_operation() {
        let server = MockServer::new();
        server.create_user("alice").unwrap();
        let session = Arc::new(server.log_in("alice").unwrap());
        let mut alice = ChatSyncEngine::start(Arc::new(server.clone()), session.clone())
            .await
            .unwrap();
        alice
            .send_message(String::from("hi"), None)
            .await
            .expect("sending while signed in");

        session.sign_out();
        assert_eq!(
            alice.send_message(String::from("again"), None).await,
            Err(Error::NotAuthenticated),
        );
    }

    /// Store wrapper that fails every write, to exercise the optimistic
    /// rollback path.
    struct FailingWrites(MockServer);

    #[async_trait]
    impl RemoteStore for FailingWrites {
        async fn read(&self, path: &Path) -> Result<Option<Value>, Error> {
            self.0.read(path).await
        }
        async fn write(&self, _: &Path, _: Value) -> Result<(), Error> {
            Err(Error::Unknown(String::from("write refused")))
        }
        async fn update(
            &self,
            path: &Path,
            fields: serde_json::Map<String, Value>,
        ) -> Result<(), Error> {
            self.0.update(path, fields).await
        }
        async fn remove(&self, path: &Path) -> Result<(), Error> {
            self.0.remove(path).await
        }
        async fn compare_and_swap(
            &self,
            path: &Path,
            expected: Option<Value>,
            new: Option<Value>,
        ) -> Result<bool, Error> {
            self.0.compare_and_swap(path, expected, new).await
        }
        async fn subscribe_children(&self, path: &Path) -> Result<Subscription, Error> {
            self.0.subscribe_children(path).await
        }
        async fn subscribe_value(&self, path: &Path) -> Result<Subscription, Error> {
            self.0.subscribe_value(path).await
        }
    }

    #[tokio::test]
    async fn failed_send_rolls_the_optimistic_insert_back() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        alice.store = Arc::new(FailingWrites(server.clone()));

        let res = alice.send_message(String::from("lost"), None).await;
        assert!(res.is_err());
        assert!(alice.messages().is_empty());
        assert_eq!(alice.pending_ops(), 0);
    }

    #[tokio::test]
    async fn failed_edit_rolls_back_to_previous_text() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let id = alice.send_message(String::from("hello"), None).await.unwrap();
        alice.pump().await;
        assert_eq!(alice.pending_ops(), 0);

        // swap the store out for one that refuses writes
        alice.store = Arc::new(FailingWrites(server.clone()));
        let res = alice.edit_message(id, String::from("changed")).await;
        assert!(res.is_err());
        assert_eq!(alice.message(id).unwrap().text, "hello");
        assert_eq!(alice.pending_ops(), 0);
    }
}
