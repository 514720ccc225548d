//! In-process implementation of the [`RemoteStore`] and
//! [`IdentityProvider`] contracts, for engine unit tests and multi-client
//! scenario tests. Semantics mirror the reference store service: a
//! two-level tree, change fan-out to attached listeners, and per-path
//! write serialization (one lock around the whole tree).

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use agora_api::{
    Error, IdentityProvider, Path, RemoteStore, StoreEvent, Subscription, User, UserId, Uuid,
};
use async_trait::async_trait;
use futures::channel::mpsc;
use serde_json::Value;

#[derive(Clone)]
pub struct MockServer {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    subscribers: Vec<Subscriber>,
    users: BTreeMap<UserId, String>,
}

struct Subscriber {
    id: Uuid,
    path: Path,
    kind: SubKind,
    sender: mpsc::UnboundedSender<StoreEvent>,
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum SubKind {
    Children,
    Value,
}

impl Inner {
    fn snapshot(&self, path: &Path) -> Value {
        match path.split() {
            (coll, None) => match self.collections.get(coll) {
                None => Value::Null,
                Some(children) => Value::Object(
                    children
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                ),
            },
            (coll, Some(key)) => self
                .collections
                .get(coll)
                .and_then(|children| children.get(key))
                .cloned()
                .unwrap_or(Value::Null),
        }
    }

    /// Fans `event` out to the listeners watching the collection that
    /// contains `child`, plus snapshot events to value listeners. Closed
    /// receivers are pruned as a side effect.
    fn notify_child(&mut self, coll: &str, event: StoreEvent) {
        let coll_snapshot = self.snapshot(&Path::parse(coll).expect("collection name is a path"));
        let child_key = match &event {
            StoreEvent::ChildAdded { key, .. }
            | StoreEvent::ChildChanged { key, .. }
            | StoreEvent::ChildRemoved { key } => key.clone(),
            StoreEvent::ValueChanged { .. } => unreachable!("notify_child takes child events"),
        };
        self.subscribers.retain(|sub| {
            let (sub_coll, sub_key) = sub.path.split();
            if sub_coll != coll {
                return true;
            }
            let to_send = match (sub.kind, sub_key) {
                (SubKind::Children, None) => Some(event.clone()),
                (SubKind::Value, None) => Some(StoreEvent::ValueChanged {
                    value: coll_snapshot.clone(),
                }),
                (SubKind::Value, Some(key)) if *key == child_key => {
                    let value = match &event {
                        StoreEvent::ChildRemoved { .. } => Value::Null,
                        StoreEvent::ChildAdded { value, .. }
                        | StoreEvent::ChildChanged { value, .. } => value.clone(),
                        StoreEvent::ValueChanged { .. } => unreachable!(),
                    };
                    Some(StoreEvent::ValueChanged { value })
                }
                _ => None,
            };
            match to_send {
                None => true,
                Some(e) => sub.sender.unbounded_send(e).is_ok(),
            }
        });
    }

    fn set_child(&mut self, coll: &str, key: &str, value: Value) {
        let existed = self
            .collections
            .entry(String::from(coll))
            .or_insert_with(BTreeMap::new)
            .insert(String::from(key), value.clone())
            .is_some();
        let event = match existed {
            false => StoreEvent::ChildAdded {
                key: String::from(key),
                value,
            },
            true => StoreEvent::ChildChanged {
                key: String::from(key),
                value,
            },
        };
        self.notify_child(coll, event);
    }

    fn remove_child(&mut self, coll: &str, key: &str) {
        let existed = self
            .collections
            .get_mut(coll)
            .map(|children| children.remove(key).is_some())
            .unwrap_or(false);
        if existed {
            self.notify_child(
                coll,
                StoreEvent::ChildRemoved {
                    key: String::from(key),
                },
            );
        }
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            inner: Arc::new(Mutex::new(Inner {
                collections: HashMap::new(),
                subscribers: Vec::new(),
                users: BTreeMap::new(),
            })),
        }
    }

    pub fn create_user(&self, name: &str) -> Result<User, Error> {
        agora_api::validate_string(name)?;
        let mut inner = self.lock();
        if inner.users.values().any(|n| n == name) {
            return Err(Error::NameAlreadyUsed(String::from(name)));
        }
        let user = User {
            id: UserId(Uuid::new_v4()),
            name: String::from(name),
        };
        inner.users.insert(user.id, user.name.clone());
        Ok(user)
    }

    /// An identity handle signed in as `name`.
    pub fn log_in(&self, name: &str) -> Result<MockSession, Error> {
        let inner = self.lock();
        let user = inner
            .users
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(id, n)| User {
                id: *id,
                name: n.clone(),
            })
            .ok_or(Error::PermissionDenied)?;
        Ok(MockSession::new(self.clone(), Some(user)))
    }

    /// An identity handle with no current principal.
    pub fn signed_out(&self) -> MockSession {
        MockSession::new(self.clone(), None)
    }

    /// Number of currently attached listeners, for teardown assertions.
    pub fn test_num_subscribers(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock store lock poisoned")
    }

    fn subscribe(&self, path: &Path, kind: SubKind) -> Subscription {
        let (sender, receiver) = mpsc::unbounded();
        let id = Uuid::new_v4();
        let mut inner = self.lock();
        match kind {
            SubKind::Children => {
                // replay existing children so a late subscriber catches up
                if let (coll, None) = path.split() {
                    if let Some(children) = inner.collections.get(coll) {
                        for (key, value) in children {
                            let _ = sender.unbounded_send(StoreEvent::ChildAdded {
                                key: key.clone(),
                                value: value.clone(),
                            });
                        }
                    }
                }
            }
            SubKind::Value => {
                let _ = sender.unbounded_send(StoreEvent::ValueChanged {
                    value: inner.snapshot(path),
                });
            }
        }
        inner.subscribers.push(Subscriber {
            id,
            path: path.clone(),
            kind,
            sender,
        });
        drop(inner);
        let registry = Arc::clone(&self.inner);
        Subscription::new(
            receiver,
            Box::new(move || {
                registry
                    .lock()
                    .expect("mock store lock poisoned")
                    .subscribers
                    .retain(|s| s.id != id);
            }),
        )
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

#[async_trait]
impl RemoteStore for MockServer {
    async fn read(&self, path: &Path) -> Result<Option<Value>, Error> {
        let snapshot = self.lock().snapshot(path);
        Ok(match snapshot {
            Value::Null => None,
            v => Some(v),
        })
    }

    async fn write(&self, path: &Path, value: Value) -> Result<(), Error> {
        let mut inner = self.lock();
        match path.split() {
            (coll, Some(key)) => inner.set_child(coll, key, value),
            (coll, None) => {
                // wholesale collection replacement, fanned out per child
                let new: BTreeMap<String, Value> = match value {
                    Value::Object(map) => map.into_iter().collect(),
                    Value::Null => BTreeMap::new(),
                    _ => return Err(Error::Unknown(String::from("collection must be an object"))),
                };
                let old_keys: Vec<String> = inner
                    .collections
                    .get(coll)
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default();
                for key in old_keys {
                    if !new.contains_key(&key) {
                        inner.remove_child(coll, &key);
                    }
                }
                for (key, value) in new {
                    let unchanged = inner
                        .collections
                        .get(coll)
                        .and_then(|c| c.get(&key))
                        .map(|old| *old == value)
                        .unwrap_or(false);
                    if !unchanged {
                        inner.set_child(coll, &key, value);
                    }
                }
            }
        }
        Ok(())
    }

    async fn update(
        &self,
        path: &Path,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), Error> {
        let mut inner = self.lock();
        let (coll, key) = path.split();
        let key = key.ok_or_else(|| Error::NotFound(path.to_string()))?;
        let mut current = match inner.snapshot(path) {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        current.extend(fields);
        inner.set_child(coll, &String::from(key), Value::Object(current));
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), Error> {
        let mut inner = self.lock();
        match path.split() {
            (coll, Some(key)) => {
                let key = String::from(key);
                inner.remove_child(coll, &key);
            }
            (coll, None) => {
                let keys: Vec<String> = inner
                    .collections
                    .get(coll)
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default();
                for key in keys {
                    inner.remove_child(coll, &key);
                }
            }
        }
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        path: &Path,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, Error> {
        let mut inner = self.lock();
        let (coll, key) = path.split();
        let key = String::from(key.ok_or_else(|| Error::NotFound(path.to_string()))?);
        let current = match inner.snapshot(path) {
            Value::Null => None,
            v => Some(v),
        };
        if current != expected {
            return Ok(false);
        }
        match new {
            Some(value) => inner.set_child(coll, &key, value),
            None => inner.remove_child(coll, &key),
        }
        Ok(true)
    }

    async fn subscribe_children(&self, path: &Path) -> Result<Subscription, Error> {
        Ok(self.subscribe(path, SubKind::Children))
    }

    async fn subscribe_value(&self, path: &Path) -> Result<Subscription, Error> {
        Ok(self.subscribe(path, SubKind::Value))
    }
}

pub struct MockSession {
    server: MockServer,
    state: Arc<Mutex<SessionState>>,
}

struct SessionState {
    user: Option<User>,
    watchers: Vec<mpsc::UnboundedSender<Option<User>>>,
}

impl MockSession {
    fn new(server: MockServer, user: Option<User>) -> MockSession {
        MockSession {
            server,
            state: Arc::new(Mutex::new(SessionState {
                user,
                watchers: Vec::new(),
            })),
        }
    }

    pub fn sign_in(&self, name: &str) -> Result<User, Error> {
        let user = {
            let inner = self.server.lock();
            inner
                .users
                .iter()
                .find(|(_, n)| *n == name)
                .map(|(id, n)| User {
                    id: *id,
                    name: n.clone(),
                })
                .ok_or(Error::PermissionDenied)?
        };
        self.set_principal(Some(user.clone()));
        Ok(user)
    }

    pub fn sign_out(&self) {
        self.set_principal(None);
    }

    fn set_principal(&self, user: Option<User>) {
        let mut state = self.lock_state();
        state.user = user.clone();
        state
            .watchers
            .retain(|w| w.unbounded_send(user.clone()).is_ok());
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("mock session lock poisoned")
    }
}

#[async_trait]
impl IdentityProvider for MockSession {
    fn current_principal(&self) -> Option<User> {
        self.lock_state().user.clone()
    }

    fn principal_changes(&self) -> mpsc::UnboundedReceiver<Option<User>> {
        let (sender, receiver) = mpsc::unbounded();
        self.lock_state().watchers.push(sender);
        receiver
    }

    async fn all_principals(&self) -> Result<Vec<User>, Error> {
        Ok(self
            .server
            .lock()
            .users
            .iter()
            .map(|(id, name)| User {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }
}
