//! # User & Message Store
//!
//! Layers on top of `crate::auth::UserStore` (identity, status ladder,
//! unique-index pointers) to add the pieces that ride the same
//! cache/stream primitives as the catalog families: province/city/
//! non-registered membership sets for targeted messaging, and the
//! `message` family itself — published through `crate::pipeline` exactly
//! like a product or price change, so clients discover new messages by
//! polling the same sync protocol.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::{AuthError, User, UserStatus};
use crate::cache::{CacheStore, Family};
use crate::kv::{KvResult, KvStore};
use crate::pipeline::detect_and_commit;
use crate::sync::deletion_hash;

fn province_key(province: &str) -> String {
    format!("province:{province}:users")
}

fn city_key(city: &str) -> String {
    format!("city:{city}:users")
}

const NON_REGISTERED_SET: &str = "non_registered:users";

/// Maintain the province/city/non-registered membership sets for a user.
/// Called once at registration and again whenever status crosses the
/// `unregistered` boundary; membership in `non_registered:users` is
/// removed the moment a user advances past `Unregistered`.
pub async fn index_user_location(
    kv: &dyn KvStore,
    user: &User,
    province: Option<&str>,
    city: Option<&str>,
) -> KvResult<()> {
    if let Some(province) = province {
        kv.sadd(&province_key(province), &user.id).await?;
    }
    if let Some(city) = city {
        kv.sadd(&city_key(city), &user.id).await?;
    }
    match user.status {
        UserStatus::Unregistered => kv.sadd(NON_REGISTERED_SET, &user.id).await,
        _ => kv.srem(NON_REGISTERED_SET, &user.id).await,
    }
}

/// A message targeted at a single user (or broadcast, represented by the
/// absence of a `user_id` at a higher layer -- this store only deals with
/// per-user delivery records).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub created_at: String,
    #[serde(default)]
    pub deleted: bool,
}

fn user_messages_set(user_id: &str) -> String {
    format!("user:{user_id}:messages")
}

/// Store a new message for `user_id`, publish it to `message_changes`, and
/// index it under the user's message set. Returns the committed message.
pub async fn create_message(
    kv: &dyn KvStore,
    user_id: &str,
    title: &str,
    body: &str,
    created_at: &str,
) -> Result<Message, AuthError> {
    let message = Message {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        created_at: created_at.to_string(),
        deleted: false,
    };

    let value = serde_json::to_value(&message).map_err(|e| AuthError::Internal(e.to_string()))?;
    detect_and_commit(kv, Family::Message, &message.id, &value, None)
        .await
        .map_err(AuthError::from)?;

    kv.sadd(&user_messages_set(user_id), &message.id).await?;
    Ok(message)
}

/// Soft-delete a message: tag it `deleted: true`, commit that as the new
/// cache value (so the hash changes and a stream entry is appended), and
/// leave it in the user's message set -- the client still needs to see
/// the tombstone once via sync to retire its local copy.
pub async fn delete_message(kv: &dyn KvStore, message_id: &str) -> Result<(), AuthError> {
    let cache = CacheStore::new(kv);
    cache
        .read_hash(Family::Message, message_id)
        .await?
        .ok_or_else(|| AuthError::Internal(format!("message {message_id} not found")))?;

    // The tombstone's hash is the canonical deletion hash, by construction
    // of `H({deleted: true, entity_id})` -- no need to assert it separately.
    let value = json!({"deleted": true, "entity_id": message_id});
    detect_and_commit(kv, Family::Message, message_id, &value, None)
        .await
        .map_err(AuthError::from)?;
    Ok(())
}

/// A single page of a user's messages, newest first by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

/// Hard upper bound on a single page, independent of what the caller asks
/// for -- protects the KV store from a client requesting an unbounded page.
const MAX_PAGE_SIZE: usize = 100;

/// List `user_id`'s messages newest-first, paginating by `created_at`
/// cursor (exclusive: only messages strictly older than the cursor are
/// returned). Read status is tracked client-side and never affects this
/// listing.
pub async fn list_messages(
    kv: &dyn KvStore,
    user_id: &str,
    cursor: Option<&str>,
    limit: usize,
) -> KvResult<MessagePage> {
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let cache = CacheStore::new(kv);
    let ids = kv.smembers(&user_messages_set(user_id)).await?;

    let mut messages = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(entry) = cache.read_hash(Family::Message, &id).await? {
            if let Ok(message) = serde_json::from_value::<Message>(entry.data) {
                if !message.deleted {
                    messages.push(message);
                }
            }
        }
    }

    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if let Some(cursor) = cursor {
        messages.retain(|m| m.created_at.as_str() < cursor);
    }

    let next_cursor = if messages.len() > limit {
        messages.truncate(limit);
        messages.last().map(|m| m.created_at.clone())
    } else {
        None
    };

    Ok(MessagePage { messages, next_cursor })
}
