use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;

use crate::{
    api::{
        Error, IdentityProvider, OptionId, Path, Poll, PollId, RemoteStore, StoreEvent,
        Subscription, UserId, MAX_POLLS_PER_CREATOR,
    },
    MAX_CAS_ATTEMPTS,
};

/// Client-side synchronization engine for live polls: owns the local poll
/// list and mediates every read and write on the `polls` path. Votes and
/// edits go through a compare-and-swap loop so that concurrent voters
/// never lose each other's tallies.
pub struct PollSyncEngine {
    store: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,

    polls: Vec<Poll>,
    polls_sub: Subscription,
}

impl PollSyncEngine {
    pub async fn start(
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<PollSyncEngine, Error> {
        let polls_sub = store.subscribe_value(&Path::polls()).await?;
        Ok(PollSyncEngine {
            store,
            identity,
            polls: Vec::new(),
            polls_sub,
        })
    }

    pub fn shutdown(mut self) {
        self.polls_sub.cancel();
    }

    /// Polls in key order.
    pub fn polls(&self) -> &[Poll] {
        &self.polls
    }

    pub fn poll(&self, id: PollId) -> Option<&Poll> {
        self.polls.iter().find(|p| p.id == id)
    }

    /// Whether the current principal already voted on this poll, per the
    /// local snapshot.
    pub fn has_voted(&self, id: PollId) -> bool {
        let Some(me) = self.identity.current_principal() else {
            return false;
        };
        self.poll(id)
            .map(|p| p.voted_by.contains(&me.id))
            .unwrap_or(false)
    }

    /// Creates a poll, enforcing the per-creator cap against the
    /// authoritative store snapshot (not the local cache, which may lag
    /// behind the caller's own creations). At least two options are
    /// required and every string must be non-empty.
    pub async fn add_poll(
        &mut self,
        question: String,
        options: Vec<String>,
    ) -> Result<PollId, Error> {
        let me = self
            .identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        agora_api::validate_string(&question)?;
        for opt in &options {
            agora_api::validate_string(opt)?;
        }
        if options.len() < 2 {
            return Err(Error::NotEnoughOptions { got: options.len() });
        }
        if self.polls_created_by(me.id).await? >= MAX_POLLS_PER_CREATOR {
            return Err(Error::TooManyPolls {
                limit: MAX_POLLS_PER_CREATOR,
            });
        }

        let poll = Poll::new(question, options, me.id);
        let id = poll.id;
        self.store
            .write(&Path::poll(id), crate::encode(&poll)?)
            .await?;
        Ok(id)
    }

    async fn polls_created_by(&self, creator: UserId) -> Result<usize, Error> {
        let children = match self.store.read(&Path::polls()).await? {
            None => return Ok(0),
            Some(Value::Object(children)) => children,
            Some(other) => {
                tracing::warn!(?other, "polls snapshot is not an object");
                return Ok(0);
            }
        };
        Ok(children
            .into_iter()
            .filter_map(|(_, value)| crate::decode::<Poll>(value).ok())
            .filter(|p| p.created_by == creator)
            .count())
    }

    /// Rewrites the question and option texts in place. Vote tallies
    /// survive for options whose position is unchanged; the swap loop
    /// makes sure a vote landing mid-edit is never dropped.
    pub async fn edit_poll(
        &mut self,
        id: PollId,
        question: String,
        options: Vec<String>,
    ) -> Result<(), Error> {
        self.identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        agora_api::validate_string(&question)?;
        for opt in &options {
            agora_api::validate_string(opt)?;
        }
        if options.len() < 2 {
            return Err(Error::NotEnoughOptions { got: options.len() });
        }

        let path = Path::poll(id);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .read(&path)
                .await?
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            let mut poll: Poll = crate::decode(current.clone())?;
            poll.apply_edit(question.clone(), options.clone());
            if self
                .store
                .compare_and_swap(&path, Some(current), Some(crate::encode(&poll)?))
                .await?
            {
                return Ok(());
            }
        }
        Err(Error::Conflict(path.to_string()))
    }

    /// Casts the current principal's single vote. The vote-once check runs
    /// against the freshest store snapshot inside the swap loop, so two
    /// devices of the same user cannot both get a vote in.
    pub async fn vote(&mut self, id: PollId, option: &OptionId) -> Result<(), Error> {
        let me = self
            .identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        // cheap local refusal before touching the store
        if self.has_voted(id) {
            return Err(Error::AlreadyVoted(id));
        }

        let path = Path::poll(id);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .read(&path)
                .await?
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
            let mut poll: Poll = crate::decode(current.clone())?;
            poll.register_vote(me.id, option)?;
            if self
                .store
                .compare_and_swap(&path, Some(current), Some(crate::encode(&poll)?))
                .await?
            {
                return Ok(());
            }
        }
        Err(Error::Conflict(path.to_string()))
    }

    pub async fn remove_poll(&mut self, id: PollId) -> Result<(), Error> {
        self.identity
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        if self.poll(id).is_none() {
            return Err(Error::NotFound(Path::poll(id).to_string()));
        }
        self.store.remove(&Path::poll(id)).await
    }

    /// Applies every snapshot already delivered by the subscription.
    /// Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.polls_sub.try_recv() {
            self.apply_snapshot(event);
            applied += 1;
        }
        applied
    }

    /// Waits for and applies the next snapshot. Returns false once the
    /// subscription is closed.
    pub async fn process_one(&mut self) -> bool {
        match self.polls_sub.next().await {
            Some(event) => {
                self.apply_snapshot(event);
                true
            }
            None => false,
        }
    }

    fn apply_snapshot(&mut self, event: StoreEvent) {
        let value = match event {
            StoreEvent::ValueChanged { value } => value,
            _ => {
                tracing::warn!("unexpected child event on the polls value subscription");
                return;
            }
        };
        self.polls = match value {
            Value::Null => Vec::new(),
            Value::Object(children) => children
                .into_iter()
                .filter_map(|(key, value)| match crate::decode::<Poll>(value) {
                    Ok(poll) => Some(poll),
                    Err(err) => {
                        tracing::warn!(?err, %key, "dropping unparseable poll snapshot");
                        None
                    }
                })
                .collect(),
            other => {
                tracing::warn!(?other, "polls snapshot is not an object");
                return;
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_mock_server::MockServer;

    async fn engine_for(server: &MockServer, name: &str) -> PollSyncEngine {
        server.create_user(name).expect("creating user");
        let session = server.log_in(name).expect("logging in");
        let mut engine = PollSyncEngine::start(Arc::new(server.clone()), Arc::new(session))
            .await
            .expect("starting engine");
        engine.pump();
        engine
    }

    fn opt(id: &str) -> OptionId {
        OptionId(String::from(id))
    }

    #[tokio::test]
    async fn created_polls_fan_out_to_other_clients() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice
            .add_poll(
                String::from("lunch?"),
                vec![String::from("pizza"), String::from("ramen")],
            )
            .await
            .expect("creating poll");

        bob.pump();
        let seen = bob.poll(id).expect("bob sees the poll");
        assert_eq!(seen.question, "lunch?");
        assert_eq!(seen.options.len(), 2);
        assert_eq!(seen.total_votes(), 0);
    }

    #[tokio::test]
    async fn poll_creation_is_capped_per_creator() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;

        // never pumping: the cap must hold even when the local cache has
        // not caught up with the creator's own polls
        for n in 0..MAX_POLLS_PER_CREATOR {
            alice
                .add_poll(
                    format!("poll {n}?"),
                    vec![String::from("yes"), String::from("no")],
                )
                .await
                .expect("poll under the cap");
        }
        assert_eq!(
            alice
                .add_poll(
                    String::from("one too many?"),
                    vec![String::from("yes"), String::from("no")],
                )
                .await,
            Err(Error::TooManyPolls {
                limit: MAX_POLLS_PER_CREATOR,
            }),
        );

        // another creator is not affected by alice's cap
        let mut bob = engine_for(&server, "bob").await;
        bob.add_poll(
            String::from("bob's poll?"),
            vec![String::from("yes"), String::from("no")],
        )
        .await
        .expect("bob's first poll");
    }

    #[tokio::test]
    async fn polls_need_at_least_two_options() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        assert_eq!(
            alice
                .add_poll(String::from("solo?"), vec![String::from("only")])
                .await,
            Err(Error::NotEnoughOptions { got: 1 }),
        );
        assert_eq!(
            alice.add_poll(String::from("  "), vec![]).await,
            Err(Error::EmptyText),
        );
    }

    #[tokio::test]
    async fn double_vote_is_refused_and_changes_nothing() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice
            .add_poll(
                String::from("lunch?"),
                vec![String::from("pizza"), String::from("ramen")],
            )
            .await
            .unwrap();
        bob.pump();

        bob.vote(id, &opt("0")).await.expect("first vote");
        bob.pump();
        assert!(bob.has_voted(id));
        assert_eq!(bob.vote(id, &opt("1")).await, Err(Error::AlreadyVoted(id)));

        alice.pump();
        let seen = alice.poll(id).unwrap();
        assert_eq!(seen.options[0].votes, 1);
        assert_eq!(seen.options[1].votes, 0);
        assert_eq!(seen.total_votes(), 1);
    }

    #[tokio::test]
    async fn vote_on_unknown_option_is_refused() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let id = alice
            .add_poll(
                String::from("lunch?"),
                vec![String::from("pizza"), String::from("ramen")],
            )
            .await
            .unwrap();
        alice.pump();
        assert_eq!(
            alice.vote(id, &opt("9")).await,
            Err(Error::UnknownOption(String::from("9"))),
        );
    }

    #[tokio::test]
    async fn concurrent_votes_from_two_users_both_land() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;
        let mut carol = engine_for(&server, "carol").await;

        let id = alice
            .add_poll(
                String::from("lunch?"),
                vec![String::from("pizza"), String::from("ramen")],
            )
            .await
            .unwrap();
        bob.pump();
        carol.pump();

        let opt0 = opt("0");
        let opt1 = opt("1");
        let (rb, rc) = futures::join!(bob.vote(id, &opt0), carol.vote(id, &opt1));
        rb.expect("bob's vote");
        rc.expect("carol's vote");

        alice.pump();
        let seen = alice.poll(id).unwrap();
        assert_eq!(seen.options[0].votes, 1);
        assert_eq!(seen.options[1].votes, 1);
        assert_eq!(seen.total_votes(), 2);
    }

    #[tokio::test]
    async fn edit_preserves_tallies_for_stable_positions() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice
            .add_poll(
                String::from("lunch?"),
                vec![String::from("pizza"), String::from("ramen")],
            )
            .await
            .unwrap();
        bob.pump();
        bob.vote(id, &opt("1")).await.expect("voting");

        alice
            .edit_poll(
                id,
                String::from("dinner?"),
                vec![
                    String::from("pizza"),
                    String::from("ramen"),
                    String::from("tacos"),
                ],
            )
            .await
            .expect("editing");

        bob.pump();
        let seen = bob.poll(id).unwrap();
        assert_eq!(seen.question, "dinner?");
        assert_eq!(seen.options[1].votes, 1);
        assert_eq!(seen.options[2].votes, 0);
        assert!(bob.has_voted(id));
    }

    #[tokio::test]
    async fn removed_polls_disappear_everywhere() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let mut bob = engine_for(&server, "bob").await;

        let id = alice
            .add_poll(
                String::from("lunch?"),
                vec![String::from("pizza"), String::from("ramen")],
            )
            .await
            .unwrap();
        alice.pump();
        bob.pump();

        alice.remove_poll(id).await.expect("removing");
        alice.pump();
        bob.pump();
        assert!(alice.poll(id).is_none());
        assert!(bob.poll(id).is_none());
    }

    #[tokio::test]
    async fn anonymous_clients_can_watch_but_not_write() {
        let server = MockServer::new();
        let mut alice = engine_for(&server, "alice").await;
        let id = alice
            .add_poll(
                String::from("lunch?"),
                vec![String::from("pizza"), String::from("ramen")],
            )
            .await
            .unwrap();

        let mut anon = PollSyncEngine::start(
            Arc::new(server.clone()),
            Arc::new(server.signed_out()),
        )
        .await
        .unwrap();
        anon.pump();
        assert!(anon.poll(id).is_some());
        assert_eq!(
            anon.vote(id, &opt("0")).await,
            Err(Error::NotAuthenticated),
        );
        assert!(!anon.has_voted(id));
    }

    #[tokio::test]
    async fn shutdown_detaches_the_listener() {
        let server = MockServer::new();
        let alice = engine_for(&server, "alice").await;
        assert_eq!(server.test_num_subscribers(), 1);
        alice.shutdown();
        assert_eq!(server.test_num_subscribers(), 0);
    }
}
