//! Player roster reconstruction.
//!
//! The roster is rebuilt on every reconciliation from two sources: the
//! live process (connected players, through the [`PlayerQuery`]
//! collaborator) and the ban/operator list files the server itself
//! maintains in its root directory. Entries are merged by player name;
//! one name can be online, banned and an operator at the same time.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const BANNED_PLAYERS_FILE: &str = "banned-players.json";
const OPS_FILE: &str = "ops.json";

/// One player as seen by a server instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub online: bool,
    pub operator: bool,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub ban_since: Option<String>,
}

impl Player {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// External collaborator answering "who is connected right now" for a
/// server listening on a given query port.
#[async_trait]
pub trait PlayerQuery: Send + Sync {
    async fn online_players(&self, port: u16) -> Result<Vec<String>>;
}

/// Default query that never sees anyone online. Used when no query
/// protocol client is wired in.
pub struct NoQuery;

#[async_trait]
impl PlayerQuery for NoQuery {
    async fn online_players(&self, _port: u16) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct BanEntry {
    name: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpEntry {
    name: String,
}

/// Merge online names with the ban/op list files under `base_dir`.
///
/// Missing files contribute nothing; a malformed file is skipped with a
/// warning rather than failing the roster.
pub fn merge_roster(online: &[String], base_dir: &Path) -> HashMap<String, Player> {
    let mut players: HashMap<String, Player> = HashMap::new();

    for name in online {
        players.entry(name.clone()).or_insert_with(|| Player::named(name)).online = true;
    }

    for entry in read_list::<BanEntry>(&base_dir.join(BANNED_PLAYERS_FILE)) {
        let player = players
            .entry(entry.name.clone())
            .or_insert_with(|| Player::named(&entry.name));
        player.banned = true;
        player.ban_reason = entry.reason;
        player.ban_since = entry.created;
    }

    for entry in read_list::<OpEntry>(&base_dir.join(OPS_FILE)) {
        players
            .entry(entry.name.clone())
            .or_insert_with(|| Player::named(&entry.name))
            .operator = true;
    }

    players
}

fn read_list<T: serde::de::DeserializeOwned>(path: &Path) -> Vec<T> {
    if !path.is_file() {
        return Vec::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Malformed roster file, skipping");
                Vec::new()
            }
        },
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Unreadable roster file, skipping");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_combines_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(BANNED_PLAYERS_FILE),
            r#"[{"name": "Steve", "reason": "griefing", "created": "2024-01-01"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(OPS_FILE),
            r#"[{"name": "Steve"}, {"name": "Alex"}]"#,
        )
        .unwrap();

        let online = vec!["Steve".to_string(), "Herobrine".to_string()];
        let players = merge_roster(&online, dir.path());

        assert_eq!(players.len(), 3);

        let steve = &players["Steve"];
        assert!(steve.online && steve.operator && steve.banned);
        assert_eq!(steve.ban_reason.as_deref(), Some("griefing"));
        assert_eq!(steve.ban_since.as_deref(), Some("2024-01-01"));

        let alex = &players["Alex"];
        assert!(alex.operator && !alex.online && !alex.banned);

        let herobrine = &players["Herobrine"];
        assert!(herobrine.online && !herobrine.operator && !herobrine.banned);
    }

    #[test]
    fn test_missing_files_contribute_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let players = merge_roster(&["Steve".to_string()], dir.path());
        assert_eq!(players.len(), 1);
        assert!(players["Steve"].online);
    }

    #[test]
    fn test_malformed_file_does_not_poison_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(BANNED_PLAYERS_FILE), "not json").unwrap();
        std::fs::write(dir.path().join(OPS_FILE), r#"[{"name": "Alex"}]"#).unwrap();

        let players = merge_roster(&[], dir.path());
        assert_eq!(players.len(), 1);
        assert!(players["Alex"].operator);
    }
}
