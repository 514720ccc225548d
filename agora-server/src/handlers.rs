use agora_api::{AuthToken, NewSession, NewUser, Path, User, UserId, Uuid};
use axum::{
    extract::{ws::Message, Path as UrlPath, State, WebSocketUpgrade},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;

use crate::{
    extractors::*,
    feeds::ChangeFeeds,
    Error,
};

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    State(directory): State<SharedDirectory>,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    directory.write().await.create_user(data)
}

pub async fn auth(
    State(directory): State<SharedDirectory>,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate_except_pow()?;
    // in test setup, also allow the "empty" pow to work
    #[cfg(test)]
    if !data.verify_pow() && !data.pow.is_empty() {
        return Err(Error::invalid_pow());
    }
    #[cfg(not(test))]
    if !data.verify_pow() {
        return Err(Error::invalid_pow());
    }
    Ok(Json(
        directory
            .write()
            .await
            .login(&data)
            .ok_or(Error::permission_denied())?,
    ))
}

pub async fn unauth(user: PreAuth, State(directory): State<SharedDirectory>) -> Result<(), Error> {
    match directory.write().await.logout(&user.0) {
        true => Ok(()),
        false => Err(Error::permission_denied()),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<UserId> {
    Json(user)
}

pub async fn fetch_users(
    Auth(_user): Auth,
    State(directory): State<SharedDirectory>,
) -> Json<Vec<User>> {
    Json(directory.read().await.users())
}

pub async fn store_read(
    Auth(_user): Auth,
    State(store): State<SharedStore>,
    UrlPath(path): UrlPath<String>,
) -> Result<Json<Value>, Error> {
    let path = Path::parse(&path)?;
    Ok(Json(store.read().await.snapshot(&path)))
}

pub async fn store_write(
    Auth(_user): Auth,
    State(store): State<SharedStore>,
    State(feeds): State<ChangeFeeds>,
    UrlPath(path): UrlPath<String>,
    Json(value): Json<Value>,
) -> Result<(), Error> {
    let path = Path::parse(&path)?;
    let changes = store.write().await.write(&path, value)?;
    feeds.relay(changes).await;
    Ok(())
}

pub async fn store_update(
    Auth(_user): Auth,
    State(store): State<SharedStore>,
    State(feeds): State<ChangeFeeds>,
    UrlPath(path): UrlPath<String>,
    Json(fields): Json<serde_json::Map<String, Value>>,
) -> Result<(), Error> {
    let path = Path::parse(&path)?;
    let changes = store.write().await.update(&path, fields)?;
    feeds.relay(changes).await;
    Ok(())
}

pub async fn store_remove(
    Auth(_user): Auth,
    State(store): State<SharedStore>,
    State(feeds): State<ChangeFeeds>,
    UrlPath(path): UrlPath<String>,
) -> Result<(), Error> {
    let path = Path::parse(&path)?;
    let changes = store.write().await.remove(&path);
    feeds.relay(changes).await;
    Ok(())
}

#[derive(serde::Deserialize, serde::Serialize)]
pub struct CasRequest {
    pub expected: Option<Value>,
    pub new: Option<Value>,
}

pub async fn store_cas(
    Auth(_user): Auth,
    State(store): State<SharedStore>,
    State(feeds): State<ChangeFeeds>,
    UrlPath(path): UrlPath<String>,
    Json(req): Json<CasRequest>,
) -> Result<Json<bool>, Error> {
    let path = Path::parse(&path)?;
    let (swapped, changes) = store
        .write()
        .await
        .compare_and_swap(&path, req.expected, req.new)?;
    feeds.relay(changes).await;
    Ok(Json(swapped))
}

pub async fn change_feed(
    ws: WebSocketUpgrade,
    State(directory): State<SharedDirectory>,
    State(feeds): State<ChangeFeeds>,
) -> Result<axum::response::Response, Error> {
    Ok(ws.on_upgrade(move |sock| {
        let (write, read) = sock.split();
        change_feed_impl(write, read, directory, feeds)
    }))
}

pub async fn change_feed_impl<W, R>(mut write: W, mut read: R, directory: SharedDirectory, feeds: ChangeFeeds)
where
    W: 'static + Send + Unpin + futures::Sink<Message>,
    <W as futures::Sink<Message>>::Error: Send,
    R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
{
    tracing::debug!("change feed websocket connected");
    if let Some(Ok(Message::Text(token))) = read.next().await {
        if let Ok(token) = Uuid::try_from(&token as &str) {
            if let Ok(user) = directory.read().await.recover_session(AuthToken(token)) {
                if let Ok(_) = write.send(Message::Text(String::from("ok"))).await {
                    tracing::debug!(?user, "change feed websocket auth success");
                    feeds.add_socket(write, read).await;
                    return;
                }
            }
        }
        tracing::debug!(?token, "change feed websocket auth failure");
        let _ = write
            .send(Message::Text(String::from("permission denied")))
            .await;
    }
}
