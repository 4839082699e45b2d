//! Repository configuration (`<gitdir>/config`)
//!
//! Git's INI dialect: `[section]` and `[section "subsection"]` headers,
//! `key = value` lines, `#`/`;` comments. Keys are addressed as
//! `section.key` or `section.subsection.key`; section and key names are
//! case-insensitive, subsections are not.

use crate::error::{BitError, Result};
use anyhow::Context;
use std::io::Write;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    subsection: Option<String>,
    entries: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfigKey {
    section: String,
    subsection: Option<String>,
    name: String,
}

impl ConfigKey {
    fn parse(key: &str) -> Result<Self> {
        let (head, name) = key
            .rsplit_once('.')
            .with_context(|| format!("config key {key} has no section"))?;
        let (section, subsection) = match head.split_once('.') {
            Some((section, subsection)) => (section, Some(subsection.to_string())),
            None => (head, None),
        };

        if section.is_empty() || name.is_empty() {
            return Err(BitError::InvalidName(key.to_string()));
        }

        Ok(ConfigKey {
            section: section.to_ascii_lowercase(),
            subsection,
            name: name.to_ascii_lowercase(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    path: Box<Path>,
    sections: Vec<Section>,
}

impl Config {
    /// Load the file at `path`; a missing file is an empty config
    pub fn load(path: Box<Path>) -> Result<Self> {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Config {
            sections: parse(&content),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn section(&self, key: &ConfigKey) -> Option<&Section> {
        // later sections win, like later lines
        self.sections
            .iter()
            .rev()
            .find(|section| section.name == key.section && section.subsection == key.subsection)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        let key = ConfigKey::parse(key)?;

        Ok(self.section(&key).and_then(|section| {
            section
                .entries
                .iter()
                .rev()
                .find(|(name, _)| name == &key.name)
                .map(|(_, value)| value.clone())
        }))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get_str(key)?
            .map(|value| parse_bool(&value).with_context(|| format!("config key {key}")))
            .transpose()
            .map_err(Into::into)
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get_str(key)?
            .map(|value| parse_int(&value).with_context(|| format!("config key {key}")))
            .transpose()
            .map_err(Into::into)
    }

    /// Set a value and persist the file
    pub fn set_str(&mut self, key: &str, value: &str) -> Result<()> {
        let key = ConfigKey::parse(key)?;

        let position = self
            .sections
            .iter()
            .rposition(|section| section.name == key.section && section.subsection == key.subsection);
        let section = match position {
            Some(position) => &mut self.sections[position],
            None => {
                self.sections.push(Section {
                    name: key.section.clone(),
                    subsection: key.subsection.clone(),
                    entries: Vec::new(),
                });
                let last = self.sections.len() - 1;
                &mut self.sections[last]
            }
        };

        match section.entries.iter_mut().rev().find(|(name, _)| name == &key.name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => section.entries.push((key.name.clone(), value.to_string())),
        }

        self.save()
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.set_str(key, if value { "true" } else { "false" })
    }

    pub fn set_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.set_str(key, &value.to_string())
    }

    /// Remove every value of a key and persist; returns whether one existed
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let key = ConfigKey::parse(key)?;
        let mut removed = false;

        for section in &mut self.sections {
            if section.name == key.section && section.subsection == key.subsection {
                let before = section.entries.len();
                section.entries.retain(|(name, _)| name != &key.name);
                removed |= section.entries.len() != before;
            }
        }

        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Subsection names of a section, e.g. the configured remotes
    pub fn subsections(&self, section: &str) -> Vec<String> {
        let section = section.to_ascii_lowercase();
        let mut names = Vec::new();

        for candidate in &self.sections {
            if candidate.name == section
                && let Some(subsection) = &candidate.subsection
                && !names.contains(subsection)
            {
                names.push(subsection.clone());
            }
        }

        names
    }

    fn save(&self) -> Result<()> {
        let content = serialize(&self.sections);
        let parent = self
            .path
            .parent()
            .with_context(|| format!("Invalid config path {}", self.path.display()))?;
        let temp_path = parent.join(format!("config.tmp-{}", rand::random::<u64>()));

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .with_context(|| format!("Unable to create {}", temp_path.display()))?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), "saved config");
        Ok(())
    }
}

fn parse(content: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            if let Some((name, subsection)) = parse_section_header(line) {
                sections.push(Section {
                    name,
                    subsection,
                    entries: Vec::new(),
                });
            }
            continue;
        }

        // a bare key means true
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), parse_value(value)),
            None => (line, "true".to_string()),
        };

        if let Some(section) = sections.last_mut()
            && !key.is_empty()
        {
            section.entries.push((key.to_ascii_lowercase(), value));
        }
    }

    sections
}

fn parse_section_header(line: &str) -> Option<(String, Option<String>)> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;

    if let Some(quote_start) = inner.find('"') {
        let name = inner[..quote_start].trim().to_ascii_lowercase();
        let rest = &inner[quote_start + 1..];
        let quote_end = rest.rfind('"')?;

        return Some((name, Some(unescape(&rest[..quote_end]))));
    }

    Some((inner.trim().to_ascii_lowercase(), None))
}

fn parse_value(raw: &str) -> String {
    let mut value = String::new();
    let mut in_quotes = false;
    // bytes up to here came from a quoted span and survive trimming
    let mut quoted_len = 0;
    let mut chars = raw.trim().chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some(other) => value.push(other),
                None => {}
            },
            '"' => in_quotes = !in_quotes,
            '#' | ';' if !in_quotes => break,
            _ => value.push(c),
        }

        if in_quotes || c == '"' {
            quoted_len = value.len();
        }
    }

    let trimmed_len = value.trim_end().len().max(quoted_len);
    value.truncate(trimmed_len);
    value
}

fn unescape(raw: &str) -> String {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            value.extend(chars.next());
        } else {
            value.push(c);
        }
    }

    value
}

fn escape_value(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t");

    if escaped != escaped.trim() || escaped.contains(['#', ';']) {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

fn serialize(sections: &[Section]) -> String {
    let mut content = String::new();

    for section in sections {
        match &section.subsection {
            Some(subsection) => content.push_str(&format!(
                "[{} \"{}\"]\n",
                section.name,
                subsection.replace('\\', "\\\\").replace('"', "\\\"")
            )),
            None => content.push_str(&format!("[{}]\n", section.name)),
        }

        for (key, value) in &section.entries {
            content.push_str(&format!("\t{key} = {}\n", escape_value(value)));
        }
    }

    content
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" | "" => Ok(false),
        _ => anyhow::bail!("invalid boolean value: {value}"),
    }
}

fn parse_int(value: &str) -> anyhow::Result<i64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last() {
        Some('k' | 'K') => (&value[..value.len() - 1], 1024),
        Some('m' | 'M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g' | 'G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };

    let number = digits
        .parse::<i64>()
        .with_context(|| format!("invalid integer value: {value}"))?;
    number
        .checked_mul(multiplier)
        .with_context(|| format!("integer value out of range: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    const SAMPLE: &str = r#"
# global options
[core]
    bare = false
    repositoryformatversion = 0
    bigFileThreshold = 512k
[user]
    name = Test User ; trailing comment
    email = test@example.com
[remote "origin"]
    url = https://example.com/repo.git
    fetch = +refs/heads/*:refs/remotes/origin/*
[remote "up\"stream"]
    url = "/path/with # hash"
"#;

    #[fixture]
    fn config() -> (TempDir, Config) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(path.into()).unwrap();
        (temp_dir, config)
    }

    #[rstest]
    fn reads_values_by_dotted_key(config: (TempDir, Config)) {
        let (_dir, config) = config;

        assert_eq!(config.get_str("user.name").unwrap().as_deref(), Some("Test User"));
        assert_eq!(config.get_bool("core.bare").unwrap(), Some(false));
        assert_eq!(config.get_i64("core.bigfilethreshold").unwrap(), Some(512 * 1024));
        assert_eq!(
            config.get_str("remote.origin.url").unwrap().as_deref(),
            Some("https://example.com/repo.git")
        );
        assert_eq!(
            config.get_str("remote.up\"stream.url").unwrap().as_deref(),
            Some("/path/with # hash")
        );
        assert_eq!(config.get_str("user.missing").unwrap(), None);
        assert_eq!(config.subsections("remote"), vec!["origin", "up\"stream"]);
    }

    #[rstest]
    fn set_values_persist_and_reload(config: (TempDir, Config)) {
        let (_dir, mut config) = config;

        config.set_str("user.name", "Other Name").unwrap();
        config.set_bool("core.filemode", true).unwrap();
        config.set_i64("pack.depth", 50).unwrap();
        config.set_str("remote.backup.url", " padded ").unwrap();

        let reloaded = Config::load(config.path().into()).unwrap();
        assert_eq!(reloaded.get_str("user.name").unwrap().as_deref(), Some("Other Name"));
        assert_eq!(reloaded.get_bool("core.filemode").unwrap(), Some(true));
        assert_eq!(reloaded.get_i64("pack.depth").unwrap(), Some(50));
        assert_eq!(reloaded.get_str("remote.backup.url").unwrap().as_deref(), Some(" padded "));
        assert_eq!(
            reloaded.get_str("remote.origin.fetch").unwrap().as_deref(),
            Some("+refs/heads/*:refs/remotes/origin/*")
        );
    }

    #[rstest]
    fn rejects_malformed_values_and_keys(config: (TempDir, Config)) {
        let (_dir, mut config) = config;
        config.set_str("core.weird", "maybe").unwrap();

        assert!(config.get_bool("core.weird").is_err());
        assert!(config.get_i64("user.name").is_err());
        assert!(config.get_str("nodot").is_err());
    }

    #[rstest]
    fn removes_keys(config: (TempDir, Config)) {
        let (_dir, mut config) = config;

        assert!(config.remove("user.email").unwrap());
        assert!(!config.remove("user.email").unwrap());
        assert_eq!(config.get_str("user.email").unwrap(), None);
    }
}
