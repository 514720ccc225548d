use chrono::Utc;

mod auth;
pub use auth::{AuthToken, NewSession, BCRYPT_POW_COST};

mod error;
pub use error::Error;

mod feed;
pub use feed::FeedMessage;

mod identity;
pub use identity::IdentityProvider;

mod message;
pub use message::{DeliveryState, Message, MessageId, Reaction};

mod poll;
pub use poll::{OptionId, Poll, PollId, PollOption, MAX_POLLS_PER_CREATOR};

mod store;
pub use store::{Path, RemoteStore, StoreEvent, Subscription};

mod user;
pub use user::{NewUser, User, UserId};

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Strings stored in the tree must be non-empty (modulo whitespace) and
/// must not embed null bytes.
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.trim().is_empty() {
        return Err(Error::EmptyText);
    }
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}
