use std::path::PathBuf;

use crate::decoder::DEFAULT_MAX_DEPTH;
use crate::error::{ClientError, ClientResult};

/// Everything needed to open and hand-shake a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// ACL user for `AUTH <username> <password>`. Ignored without a password.
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: u32,
    /// Connect over this Unix socket instead of TCP.
    pub unix_socket: Option<PathBuf>,
    /// Array nesting limit for decoded replies.
    pub max_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            db: 0,
            unix_socket: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectionConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    pub fn unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.unix_socket.is_none() {
            if self.port == 0 {
                return Err(ClientError::Config("port must be between 1 and 65535".into()));
            }
            if self.host.is_empty() {
                return Err(ClientError::Config("host must not be empty".into()));
            }
        }
        if self.max_depth == 0 {
            return Err(ClientError::Config("max depth must be at least 1".into()));
        }
        Ok(())
    }

    /// Parse command line flags. Unknown flags and unparsable values are
    /// skipped, leaving the default in place.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = ConnectionConfig::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        if let Ok(p) = args[i + 1].parse() {
                            config.port = p;
                        }
                        i += 1;
                    }
                }
                "--password" | "-a" => {
                    if i + 1 < args.len() {
                        config.password = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--user" => {
                    if i + 1 < args.len() {
                        config.username = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--db" | "-n" => {
                    if i + 1 < args.len() {
                        if let Ok(db) = args[i + 1].parse() {
                            config.db = db;
                        }
                        i += 1;
                    }
                }
                "--socket" | "-s" => {
                    if i + 1 < args.len() {
                        config.unix_socket = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--max-depth" => {
                    if i + 1 < args.len() {
                        if let Ok(d) = args[i + 1].parse() {
                            config.max_depth = d;
                        }
                        i += 1;
                    }
                }
                "--url" | "-u" => {
                    if i + 1 < args.len() {
                        if let Ok(parsed) = Self::from_url(&args[i + 1]) {
                            config = ConnectionConfig {
                                max_depth: config.max_depth,
                                ..parsed
                            };
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        config
    }

    /// Parse `redis://[[user]:password@]host[:port][/db]` or
    /// `unix:///path/to/socket`.
    pub fn from_url(url: &str) -> ClientResult<Self> {
        if let Some(path) = url.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ClientError::Config(format!("missing socket path in {url:?}")));
            }
            return Ok(ConnectionConfig::default().unix_socket(path));
        }

        let rest = url
            .strip_prefix("redis://")
            .ok_or_else(|| ClientError::Config(format!("unsupported URL scheme in {url:?}")))?;

        let mut config = ConnectionConfig::default();

        let rest = match rest.rsplit_once('@') {
            Some((userinfo, rest)) => {
                let (user, password) = match userinfo.split_once(':') {
                    Some((user, password)) => (user, Some(password)),
                    None => (userinfo, None),
                };
                if !user.is_empty() {
                    config.username = Some(user.to_string());
                }
                if let Some(password) = password.filter(|p| !p.is_empty()) {
                    config.password = Some(password.to_string());
                }
                rest
            }
            None => rest,
        };

        let (hostport, db) = match rest.split_once('/') {
            Some((hostport, db)) => (hostport, db),
            None => (rest, ""),
        };

        if !db.is_empty() {
            config.db = db
                .parse()
                .map_err(|_| ClientError::Config(format!("invalid database index {db:?}")))?;
        }

        let (host, port) = match hostport.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| ClientError::Config(format!("invalid port {port:?}")))?;
                (host, port)
            }
            None => (hostport, config.port),
        };
        if !host.is_empty() {
            config.host = host.to_string();
        }
        config.port = port;

        config.validate()?;
        Ok(config)
    }
}
