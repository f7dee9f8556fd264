//! The `server.properties` text format.
//!
//! Line-oriented `key=value` pairs; `#`-prefixed lines are comments.
//! Surrounding whitespace and one layer of surrounding double quotes are
//! stripped from values. Everything after the first separator belongs to
//! the value, so values may themselves contain `=`.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

const SEPARATOR: char = '=';
const COMMENT: char = '#';

/// Parse properties from text.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
            continue;
        }
        let Some((key, value)) = line.split_once(SEPARATOR) else {
            continue;
        };
        props.insert(key.trim().to_string(), unquote(value.trim()).to_string());
    }
    props
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Read a properties file from disk.
pub fn load_properties(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(parse_properties(&content))
}

/// Write a properties file to disk. Keys are sorted so saves are stable
/// across runs.
pub fn save_properties(path: &Path, props: &HashMap<String, String>) -> Result<()> {
    let mut keys: Vec<&String> = props.keys().collect();
    keys.sort();

    let mut content = String::new();
    for key in keys {
        content.push_str(key);
        content.push(SEPARATOR);
        content.push_str(&props[key]);
        content.push('\n');
    }

    std::fs::write(path, content)
        .map_err(|e| Error::Io(format!("Failed to write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_pairs() {
        let props = parse_properties("server-port=25565\nmotd=A Minecraft Server\n");
        assert_eq!(props["server-port"], "25565");
        assert_eq!(props["motd"], "A Minecraft Server");
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let props = parse_properties("#Minecraft server properties\n\n  \nkey=value\n");
        assert_eq!(props.len(), 1);
        assert_eq!(props["key"], "value");
    }

    #[test]
    fn test_parse_strips_whitespace_and_quotes() {
        let props = parse_properties("  motd =  \"hello world\"  \nquoted=\"\"\n");
        assert_eq!(props["motd"], "hello world");
        assert_eq!(props["quoted"], "");
    }

    #[test]
    fn test_value_keeps_later_separators() {
        let props = parse_properties("jvm-flags=-Da=1 -Db=2\n");
        assert_eq!(props["jvm-flags"], "-Da=1 -Db=2");
    }

    #[test]
    fn test_lone_quote_is_kept() {
        let props = parse_properties("v=\"\n");
        assert_eq!(props["v"], "\"");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");

        let mut props = HashMap::new();
        props.insert("server-port".to_string(), "25565".to_string());
        props.insert("level-seed".to_string(), String::new());
        save_properties(&path, &props).unwrap();

        assert_eq!(load_properties(&path).unwrap(), props);
    }

    #[test]
    fn test_save_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.properties");

        let mut props = HashMap::new();
        props.insert("b".to_string(), "2".to_string());
        props.insert("a".to_string(), "1".to_string());
        save_properties(&path, &props).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a=1\nb=2\n");
    }
}
