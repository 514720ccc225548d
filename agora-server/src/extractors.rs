use std::sync::Arc;

use agora_api::{AuthToken, UserId, Uuid};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use tokio::sync::RwLock;

use crate::{directory::Directory, feeds::ChangeFeeds, store::StoreTree, Error};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub store: SharedStore,
    pub directory: SharedDirectory,
    pub feeds: ChangeFeeds,
    pub admin_token: Option<AuthToken>,
}

impl AppState {
    pub fn new(admin_token: Option<AuthToken>) -> AppState {
        AppState {
            store: SharedStore::new(),
            directory: SharedDirectory::new(),
            feeds: ChangeFeeds::new(),
            admin_token,
        }
    }
}

#[derive(Clone)]
pub struct SharedStore(Arc<RwLock<StoreTree>>);

impl SharedStore {
    pub fn new() -> SharedStore {
        SharedStore(Arc::new(RwLock::new(StoreTree::new())))
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, StoreTree> {
        self.0.read().await
    }

    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, StoreTree> {
        self.0.write().await
    }
}

#[derive(Clone)]
pub struct SharedDirectory(Arc<RwLock<Directory>>);

impl SharedDirectory {
    pub fn new() -> SharedDirectory {
        SharedDirectory(Arc::new(RwLock::new(Directory::new())))
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, Directory> {
        self.0.read().await
    }

    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, Directory> {
        self.0.write().await
    }
}

/// A syntactically valid bearer token, not yet checked against the live
/// sessions.
pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::permission_denied()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::permission_denied())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::permission_denied())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::permission_denied());
                }
                let token = auth.next().ok_or(Error::permission_denied())?;
                if !auth.next().is_none() {
                    return Err(Error::permission_denied());
                }
                let token = Uuid::try_from(token).map_err(|_| Error::permission_denied())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

pub struct Auth(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        Ok(Auth(state.directory.read().await.recover_session(token)?))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}
