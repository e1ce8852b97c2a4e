//! Username resolution.
//!
//! v1 identifies people by OSM display name only. v2 wants numeric OSM user
//! ids, so every name is resolved once through an external lookup service
//! and remembered in a plain text cache (`users.list`):
//!
//! ```text
//! alice;1234;
//! ghost;-1;
//! ```
//!
//! `-1` in the cache means "looked up, not found". Inside the program an
//! unresolved name is always `None`, never a numeric sentinel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lock::{FileLock, DEFAULT_LOCK_TIMEOUT_MS};

const UNRESOLVED_MARKER: i64 = -1;
const NAME_PLACEHOLDER: &str = "{name}";

/// Stable numeric user identifier in the v2 schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Maps a username to a user id, or `None` when the name is unknown.
pub trait UserResolver {
    fn resolve(&self, username: &str) -> Option<UserId>;
}

/// A user to create in the target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
}

/// Resolved usernames, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    ids: HashMap<String, Option<UserId>>,
    order: Vec<String>,
}

impl UserDirectory {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<UserId>)>,
        S: Into<String>,
    {
        let mut directory = Self::default();
        for (name, id) in pairs {
            directory.insert(name, id);
        }
        directory
    }

    pub fn insert(&mut self, username: impl Into<String>, id: Option<UserId>) {
        let username = username.into();
        if self.ids.insert(username.clone(), id).is_none() {
            self.order.push(username);
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.ids.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every known name, in first-seen order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn is_resolved(&self, username: &str) -> bool {
        self.resolve(username).is_some()
    }

    pub fn resolved_count(&self) -> usize {
        self.ids.values().filter(|id| id.is_some()).count()
    }

    /// Resolved users deduplicated by id. When several names share an id
    /// the last one seen wins.
    pub fn accounts(&self) -> Vec<UserAccount> {
        let mut by_id: BTreeMap<UserId, &str> = BTreeMap::new();
        for name in &self.order {
            if let Some(Some(id)) = self.ids.get(name) {
                by_id.insert(*id, name.as_str());
            }
        }
        by_id
            .into_iter()
            .map(|(id, username)| UserAccount {
                id,
                username: username.to_string(),
            })
            .collect()
    }
}

impl UserResolver for UserDirectory {
    fn resolve(&self, username: &str) -> Option<UserId> {
        self.ids.get(username).copied().flatten()
    }
}

/// The on-disk `name;id;` cache of previous lookups.
#[derive(Debug, Clone)]
pub struct UserCache {
    path: PathBuf,
}

impl UserCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.lock", self.path.display()))
    }

    /// Load every cached entry. A missing file is an empty cache.
    pub fn load(&self) -> Result<UserDirectory> {
        let mut directory = UserDirectory::default();
        if !self.path.exists() {
            return Ok(directory);
        }
        let content = std::fs::read_to_string(&self.path)?;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_cache_line(line) {
                Some((name, id)) => directory.insert(name, id),
                None => tracing::warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    "skipping malformed user cache line"
                ),
            }
        }
        Ok(directory)
    }

    /// Append one lookup result to the cache.
    pub fn append(&self, username: &str, id: Option<UserId>) -> Result<()> {
        if !is_cacheable(username) {
            return Err(Error::InvalidArgument(format!(
                "username {username:?} cannot be cached: it contains a line break"
            )));
        }
        let _lock = FileLock::acquire(self.lock_path(), DEFAULT_LOCK_TIMEOUT_MS)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let raw = id.map(|id| id.0).unwrap_or(UNRESOLVED_MARKER);
        writeln!(file, "{username};{raw};")?;
        Ok(())
    }
}

fn parse_cache_line(line: &str) -> Option<(&str, Option<UserId>)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let line = line.strip_suffix(';').unwrap_or(line);
    let (name, raw) = line.rsplit_once(';')?;
    if name.is_empty() {
        return None;
    }
    let raw: i64 = raw.trim().parse().ok()?;
    let id = (raw != UNRESOLVED_MARKER).then_some(UserId(raw));
    Some((name, id))
}

/// External directory mapping display names to user ids.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn lookup(&self, username: &str) -> Result<Option<UserId>>;
}

/// Lookup that never finds anyone; used with `--offline`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLookup;

#[async_trait]
impl UserLookup for OfflineLookup {
    async fn lookup(&self, _username: &str) -> Result<Option<UserId>> {
        Ok(None)
    }
}

/// Lookup backed by the WhosThat name history service.
#[derive(Debug, Clone)]
pub struct WhosThatLookup {
    client: reqwest::Client,
    url_template: String,
}

impl WhosThatLookup {
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self> {
        if !url_template.contains(NAME_PLACEHOLDER) {
            return Err(Error::InvalidConfig(format!(
                "users.lookup_url must contain {NAME_PLACEHOLDER}"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let lookup = Self {
            client,
            url_template: url_template.to_string(),
        };
        lookup.url_for("check")?;
        Ok(lookup)
    }

    fn url_for(&self, username: &str) -> Result<reqwest::Url> {
        // Substitute after parsing so the name is percent-encoded once.
        let marker = "__tmmigrate_name__";
        let mut url = reqwest::Url::parse(&self.url_template.replace(NAME_PLACEHOLDER, marker))
            .map_err(|err| Error::InvalidConfig(format!("users.lookup_url: {err}")))?;
        if !url.query_pairs().any(|(_, value)| value.contains(marker)) {
            return Err(Error::InvalidConfig(format!(
                "users.lookup_url: {NAME_PLACEHOLDER} must appear in the query string"
            )));
        }
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.replace(marker, username)))
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        Ok(url)
    }
}

#[async_trait]
impl UserLookup for WhosThatLookup {
    async fn lookup(&self, username: &str) -> Result<Option<UserId>> {
        let url = self.url_for(username)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_whosthat(&body, username)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct WhosThatEntry {
    id: RawId,
    #[serde(default)]
    names: Vec<String>,
}

/// Pick the id of the last entry listing `username` among its names.
pub fn parse_whosthat(body: &[u8], username: &str) -> Result<Option<UserId>> {
    let entries: Vec<WhosThatEntry> = serde_json::from_slice(body)?;
    Ok(entries
        .iter()
        .filter(|entry| entry.names.iter().any(|name| name == username))
        .filter_map(|entry| match &entry.id {
            RawId::Number(id) => Some(UserId(*id)),
            RawId::Text(raw) => raw.trim().parse().ok().map(UserId),
        })
        .last())
}

/// Counters from a resolution pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResolveStats {
    pub cached: usize,
    pub looked_up: usize,
    pub not_found: usize,
    pub failed: usize,
    pub rejected: usize,
}

/// Resolve every name, starting from the full cache and recording new
/// lookups in it. Cached entries for names the source never mentions are
/// kept. Failed lookups resolve to `None` and are not cached.
pub async fn resolve_usernames(
    names: &[String],
    cache: &UserCache,
    lookup: &dyn UserLookup,
) -> Result<(UserDirectory, ResolveStats)> {
    let mut directory = cache.load()?;
    let mut stats = ResolveStats::default();
    let mut seen = HashSet::new();

    for name in names {
        if name.is_empty() || !seen.insert(name.as_str()) {
            continue;
        }
        if directory.contains(name) {
            stats.cached += 1;
            continue;
        }
        if !is_cacheable(name) {
            stats.rejected += 1;
            tracing::warn!(username = ?name, "username contains a line break, left unresolved");
            directory.insert(name.as_str(), None);
            continue;
        }

        match lookup.lookup(name).await {
            Ok(id) => {
                stats.looked_up += 1;
                if id.is_none() {
                    stats.not_found += 1;
                    tracing::warn!(username = %name, "user not found");
                }
                cache.append(name, id)?;
                directory.insert(name.as_str(), id);
            }
            Err(err) => {
                stats.failed += 1;
                tracing::warn!(username = %name, error = %err, "user lookup failed");
                directory.insert(name.as_str(), None);
            }
        }
    }

    Ok((directory, stats))
}

/// Names that fit on one `name;id;` cache line.
fn is_cacheable(username: &str) -> bool {
    !username.contains(['\n', '\r'])
}
