use std::collections::{BTreeMap, HashMap};

use agora_api::{Error as ApiError, Path, StoreEvent};
use serde_json::Value;

use crate::Error;

/// One change to broadcast on the feed: the path it happened under and
/// the event itself. Each child mutation yields the child event on the
/// collection path plus a whole-collection snapshot, so feed consumers
/// can follow either granularity.
#[derive(Clone, Debug)]
pub struct Change {
    pub path: Path,
    pub event: StoreEvent,
}

/// The authoritative two-level tree: collection name to child key to
/// value. Mutations return the changes to fan out; the caller decides
/// when to broadcast them.
pub struct StoreTree {
    collections: HashMap<String, BTreeMap<String, Value>>,
}

impl StoreTree {
    pub fn new() -> StoreTree {
        StoreTree {
            collections: HashMap::new(),
        }
    }

    pub fn snapshot(&self, path: &Path) -> Value {
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

    pub fn write(&mut self, path: &Path, value: Value) -> Result<Vec<Change>, Error> {
        match path.split() {
            (coll, Some(key)) => {
                let coll = String::from(coll);
                let key = String::from(key);
                Ok(self.set_child(&coll, &key, value))
            }
            (coll, None) => {
                let coll = String::from(coll);
                let new: BTreeMap<String, Value> = match value {
                    Value::Object(map) => map.into_iter().collect(),
                    Value::Null => BTreeMap::new(),
                    _ => {
                        return Err(Error::Api(ApiError::Unknown(String::from(
                            "a collection value must be an object",
                        ))))
                    }
                };
                let mut changes = Vec::new();
                let old_keys: Vec<String> = self
                    .collections
                    .get(&coll)
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default();
                for key in old_keys {
                    if !new.contains_key(&key) {
                        changes.extend(self.remove_child(&coll, &key));
                    }
                }
                for (key, value) in new {
                    let unchanged = self
                        .collections
                        .get(&coll)
                        .and_then(|c| c.get(&key))
                        .map(|old| *old == value)
                        .unwrap_or(false);
                    if !unchanged {
                        changes.extend(self.set_child(&coll, &key, value));
                    }
                }
                Ok(changes)
            }
        }
    }

    /// Field-merge into an object child; non-object current values are
    /// replaced wholesale.
    pub fn update(
        &mut self,
        path: &Path,
        fields: serde_json::Map<String, Value>,
    ) -> Result<Vec<Change>, Error> {
        let (coll, key) = path.split();
        let key = String::from(key.ok_or_else(|| self.no_child(path))?);
        let coll = String::from(coll);
        let mut current = match self.snapshot(path) {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        current.extend(fields);
        Ok(self.set_child(&coll, &key, Value::Object(current)))
    }

    pub fn remove(&mut self, path: &Path) -> Vec<Change> {
        match path.split() {
            (coll, Some(key)) => {
                let coll = String::from(coll);
                let key = String::from(key);
                self.remove_child(&coll, &key)
            }
            (coll, None) => {
                let coll = String::from(coll);
                let keys: Vec<String> = self
                    .collections
                    .get(&coll)
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default();
                keys.into_iter()
                    .flat_map(|key| self.remove_child(&coll, &key))
                    .collect()
            }
        }
    }

    /// Atomic conditional replace. Returns whether the swap happened and
    /// the changes to fan out if it did.
    pub fn compare_and_swap(
        &mut self,
        path: &Path,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<(bool, Vec<Change>), Error> {
        let (coll, key) = path.split();
        let key = String::from(key.ok_or_else(|| self.no_child(path))?);
        let coll = String::from(coll);
        let current = match self.snapshot(path) {
            Value::Null => None,
            v => Some(v),
        };
        if current != expected {
            return Ok((false, Vec::new()));
        }
        let changes = match new {
            Some(value) => self.set_child(&coll, &key, value),
            None => self.remove_child(&coll, &key),
        };
        Ok((true, changes))
    }

    fn set_child(&mut self, coll: &str, key: &str, value: Value) -> Vec<Change> {
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
        self.changes_for(coll, event)
    }

    fn remove_child(&mut self, coll: &str, key: &str) -> Vec<Change> {
        let existed = self
            .collections
            .get_mut(coll)
            .map(|children| children.remove(key).is_some())
            .unwrap_or(false);
        if !existed {
            return Vec::new();
        }
        self.changes_for(
            coll,
            StoreEvent::ChildRemoved {
                key: String::from(key),
            },
        )
    }

    fn changes_for(&self, coll: &str, event: StoreEvent) -> Vec<Change> {
        let path = match Path::parse(coll) {
            Ok(path) => path,
            Err(_) => return Vec::new(),
        };
        let snapshot = self.snapshot(&path);
        vec![
            Change {
                path: path.clone(),
                event,
            },
            Change {
                path,
                event: StoreEvent::ValueChanged { value: snapshot },
            },
        ]
    }

    fn no_child(&self, path: &Path) -> Error {
        Error::Api(ApiError::NotFound(path.to_string()))
    }
}
