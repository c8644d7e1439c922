use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::Deserialize;
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9._-]+$").unwrap();
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid member spec '{0}', expected 'name:host:port'")]
    InvalidMember(String),

    #[error("invalid node name '{0}'")]
    InvalidName(String),

    #[error("node name '{0}' does not appear in members")]
    UnknownName(String),

    #[error("'{0}' must not be negative")]
    InvalidInterval(&'static str),
}

/// One entry of the cluster roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Member {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for Member {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Member, ConfigError> {
        let spec = s.trim();
        let mut parts = spec.split(':');
        let name = parts.next().unwrap_or_default();
        let host = parts.next().unwrap_or_default();
        let port = parts.next().unwrap_or_default();

        if name.is_empty() || host.is_empty() || parts.next().is_some() {
            return Err(ConfigError::InvalidMember(spec.to_string()));
        }
        if !NAME_RE.is_match(name) {
            return Err(ConfigError::InvalidName(name.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| ConfigError::InvalidMember(spec.to_string()))?;

        Ok(Member {
            name: name.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

/// Node configuration. Precedence is CLI overrides > `FLOCK_*` environment >
/// config file > built-in defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// This node's identifier; must appear in `members`.
    pub name: String,

    pub addr: String,
    pub port: u16,

    /// Cluster roster, comma separated `name:host:port` triples.
    pub members: String,

    /// Seconds of heartbeat silence before a follower enters the jitter
    /// window.
    pub leader_timeout: f64,
    /// Upper bound (exclusive) of the uniform random election jitter,
    /// in seconds.
    pub election_timeout_jitter: f64,
    /// Seconds between vote broadcasts while campaigning.
    pub vote_interval: f64,
    /// Seconds between heartbeat broadcasts while leading.
    pub heartbeat_interval: f64,
    /// Seconds between state reports.
    pub report_interval: f64,

    pub log_level: String,
    pub log_color: bool,

    /// Created at startup; reserved for log persistence.
    pub data_dir: String,
}

impl NodeConfig {
    pub fn load(path: Option<&str>, overrides: &[(&str, String)]) -> Result<NodeConfig, ConfigError> {
        let mut s = config::Config::new();

        s.set_default("name", "raft-1")?;
        s.set_default("addr", "127.0.0.1")?;
        s.set_default("port", 2468i64)?;
        s.set_default(
            "members",
            "raft-1:127.0.0.1:2468,raft-2:127.0.0.1:2469,raft-3:127.0.0.1:2470",
        )?;
        s.set_default("leader_timeout", 3.0)?;
        s.set_default("election_timeout_jitter", 0.3)?;
        s.set_default("vote_interval", 3.0)?;
        s.set_default("heartbeat_interval", 2.0)?;
        s.set_default("report_interval", 60.0)?;
        s.set_default("log_level", "info")?;
        s.set_default("log_color", true)?;
        s.set_default("data_dir", "./.data")?;

        match path {
            Some(path) => {
                s.merge(config::File::with_name(path))?;
            }
            None => {
                s.merge(config::File::with_name("flock").required(false))?;
            }
        }
        s.merge(config::Environment::with_prefix("FLOCK"))?;

        for (key, value) in overrides {
            s.set(*key, value.as_str())?;
        }

        let config: NodeConfig = s.try_into()?;
        config.validate()?;

        Ok(config)
    }

    /// The full roster, parsed.
    pub fn members(&self) -> Result<Vec<Member>, ConfigError> {
        self.members
            .split(',')
            .filter(|spec| !spec.trim().is_empty())
            .map(str::parse)
            .collect()
    }

    /// The roster minus this node, the recipient list for broadcasts.
    pub fn peers(&self) -> Result<Vec<Member>, ConfigError> {
        Ok(self
            .members()?
            .into_iter()
            .filter(|member| member.name != self.name)
            .collect())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !NAME_RE.is_match(&self.name) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        let members = self.members()?;
        if !members.iter().any(|member| member.name == self.name) {
            return Err(ConfigError::UnknownName(self.name.clone()));
        }

        let intervals = [
            ("leader_timeout", self.leader_timeout),
            ("election_timeout_jitter", self.election_timeout_jitter),
            ("vote_interval", self.vote_interval),
            ("heartbeat_interval", self.heartbeat_interval),
            ("report_interval", self.report_interval),
        ];
        for &(key, value) in &intervals {
            if value < 0.0 {
                return Err(ConfigError::InvalidInterval(key));
            }
        }

        Ok(())
    }
}
