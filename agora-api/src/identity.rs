use async_trait::async_trait;
use futures::channel::mpsc;

use crate::{Error, User};

/// The external identity service, reduced to what the engines consume:
/// the current authenticated principal, the directory of known
/// principals, and a notification stream for sign-in/sign-out.
///
/// The engines re-check `current_principal` on every operation, so a
/// sign-out takes effect on the next call even for a consumer ignoring
/// the change stream.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_principal(&self) -> Option<User>;

    /// Yields the new current principal after every sign-in or sign-out.
    fn principal_changes(&self) -> mpsc::UnboundedReceiver<Option<User>>;

    async fn all_principals(&self) -> Result<Vec<User>, Error>;
}
