//! Cache key namespace.
//!
//! All keys live in one flat namespace:
//!
//! - `list:<owner>` - short keys owned by `owner`
//! - `all:` - every active link across owners
//! - `staged:<owner>` - pending write-behind payload for `owner`

/// Key of the global listing.
pub const ALL_KEY: &str = "all:";

/// Key of the cached key list of `owner`.
pub fn list_key(owner: &str) -> String {
    format!("list:{}", owner)
}

/// Key of the staged write-behind payload of `owner`.
pub fn staged_key(owner: &str) -> String {
    format!("staged:{}", owner)
}
