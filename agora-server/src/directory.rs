use std::collections::HashMap;

use agora_api::{AuthToken, Error as ApiError, NewSession, NewUser, User, UserId, Uuid};

use crate::Error;

struct UserRecord {
    name: String,
    password_hash: String,
}

/// Users and their live sessions. Passwords are stored bcrypt-hashed,
/// sessions are opaque bearer tokens.
pub struct Directory {
    users: HashMap<UserId, UserRecord>,
    sessions: HashMap<AuthToken, UserId>,
}

impl Directory {
    pub fn new() -> Directory {
        Directory {
            users: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn create_user(&mut self, user: NewUser) -> Result<(), Error> {
        user.validate()?;
        if self.users.contains_key(&user.id) {
            return Err(Error::uuid_already_used(user.id.0));
        }
        if self.users.values().any(|u| u.name == user.name) {
            return Err(Error::name_already_used(user.name));
        }
        self.users.insert(
            user.id,
            UserRecord {
                name: user.name,
                password_hash: user.initial_password_hash,
            },
        );
        Ok(())
    }

    /// Opens a session if the credentials check out.
    pub fn login(&mut self, session: &NewSession) -> Option<AuthToken> {
        let (id, record) = self
            .users
            .iter()
            .find(|(_, record)| record.name == session.user)?;
        if !bcrypt::verify(&session.password, &record.password_hash).unwrap_or(false) {
            return None;
        }
        let id = *id;
        let token = AuthToken(Uuid::new_v4());
        self.sessions.insert(token, id);
        Some(token)
    }

    /// Closes a session; false when the token was not live.
    pub fn logout(&mut self, token: &AuthToken) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn recover_session(&self, token: AuthToken) -> Result<UserId, Error> {
        self.sessions
            .get(&token)
            .copied()
            .ok_or(Error::Api(ApiError::NotAuthenticated))
    }

    pub fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|(id, record)| User {
                id: *id,
                name: record.name.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        users
    }
}
