use uuid::Uuid;

use crate::{Error, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

/// A principal: an authenticated identity, as exposed by the directory.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub initial_password_hash: String,
}

impl NewUser {
    pub fn new(id: UserId, name: String, password: String) -> NewUser {
        NewUser {
            id,
            name,
            initial_password_hash: bcrypt::hash(password, bcrypt::DEFAULT_COST)
                .expect("failed hashing password"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.name)?;
        crate::validate_string(&self.initial_password_hash)?;
        if self.name.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(Error::InvalidName(self.name.clone()));
        }
        Ok(())
    }
}
