use std::fmt;
use std::sync::OnceLock;

use time::macros::format_description;
use time::OffsetDateTime;

/// Identifies one run of the shipper to the collector.
///
/// Formatted `<timestamp>-<user>-<host>-<pid>` so a collector operator can tell
/// concurrent runs apart by eye. The collector treats it as an opaque key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Builds an id from the current local time, user, host and process id.
    /// Missing environment values become empty segments.
    pub fn generate() -> Self {
        Self::from_parts(&timestamp_now(), &current_user(), &current_host(), std::process::id())
    }

    pub fn from_parts(timestamp: &str, user: &str, host: &str, pid: u32) -> Self {
        Self(format!("{timestamp}-{user}-{host}-{pid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lazily generated, write-once holder for the run's [`SessionId`].
#[derive(Debug, Default)]
pub struct SessionIdentity {
    id: OnceLock<SessionId>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// An identity that is already fixed, for callers that mint ids elsewhere.
    pub fn with_id(id: SessionId) -> Self {
        let identity = Self::default();
        let _ = identity.id.set(id);
        identity
    }

    /// Generates on first call; every later call returns the same id.
    pub fn get(&self) -> &SessionId {
        self.id.get_or_init(SessionId::generate)
    }

    pub fn is_generated(&self) -> bool {
        self.id.get().is_some()
    }
}

fn timestamp_now() -> String {
    let format = format_description!("[year][month][day]-[hour][minute][second]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format).unwrap_or_default()
}

fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| std::env::var(key).ok().filter(|value| !value.is_empty()))
}

fn current_user() -> String {
    env_first(&["USERNAME", "USER"]).unwrap_or_default()
}

fn current_host() -> String {
    env_first(&["COMPUTERNAME", "HOSTNAME"])
        .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned())
}
