//! Credential resolution: inline maps, environment prefixes and named
//! configuration entries all normalize to one [`ConnectionDescriptor`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SqlSrvError;
use crate::types::Encoding;

/// Prefix of the DSN grammar understood by sqlsrv-style drivers.
pub const DSN_PREFIX: &str = "sqlsrv";
/// Port the driver connects on when the descriptor has none.
pub const DEFAULT_PORT: u16 = 1433;
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to reach one database. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    host: String,
    port: Option<u16>,
    instance: Option<String>,
    database: String,
    username: String,
    password: String,
    charset: Encoding,
    login_timeout: Duration,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("instance", &self.instance)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("charset", &self.charset)
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}

impl ConnectionDescriptor {
    #[must_use]
    pub fn builder(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ConnectionDescriptorBuilder {
        ConnectionDescriptorBuilder::new(host, database, username, password)
    }

    /// Resolve from an inline map.
    ///
    /// Recognized keys: `host` (or `server`), `database`, `user` (or
    /// `username`), `password`, and optionally `port`, `instance`, `charset`,
    /// `login_timeout` (seconds).
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::MissingCredential` naming the first required
    /// field that is absent or blank.
    pub fn from_inline_map<V: AsRef<str>>(
        map: &HashMap<String, V>,
    ) -> Result<Self, SqlSrvError> {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| map.get(*key))
                .map(|value| value.as_ref())
                .find(|value| !value.trim().is_empty())
                .map(str::to_string)
        };
        RawCredentials {
            host: get(&["host", "server"]),
            instance: get(&["instance"]),
            port: get(&["port"]),
            database: get(&["database"]),
            username: get(&["user", "username"]),
            password: get(&["password"]),
            charset: get(&["charset"]),
            login_timeout: get(&["login_timeout"]),
        }
        .resolve("ConnectionDescriptor::from_inline_map()")
    }

    /// Resolve from `{PREFIX}_SQLSRV_*` process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::MissingCredential` if `_NAME`, `_DATABASE`,
    /// `_USER` or `_PASS` is unset or blank.
    pub fn from_environment_prefix(prefix: &str) -> Result<Self, SqlSrvError> {
        Self::from_env_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`from_environment_prefix`](Self::from_environment_prefix)
    /// with a caller-supplied variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_environment_prefix`](Self::from_environment_prefix).
    pub fn from_env_lookup<F>(prefix: &str, lookup: F) -> Result<Self, SqlSrvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{prefix}_SQLSRV_{suffix}"));
        RawCredentials {
            host: var("NAME"),
            instance: var("INSTANCE"),
            port: var("PORT"),
            database: var("DATABASE"),
            username: var("USER"),
            password: var("PASS"),
            charset: var("CHARSET"),
            login_timeout: None,
        }
        .resolve("ConnectionDescriptor::from_environment_prefix()")
    }

    /// Resolve a named entry of a connection-configuration table.
    ///
    /// # Errors
    ///
    /// Returns `SqlSrvError::ConfigError` if the entry does not exist and
    /// `SqlSrvError::MissingCredential` if it lacks a required field.
    pub fn from_named_config(table: &ConnectionTable, name: &str) -> Result<Self, SqlSrvError> {
        let entry = table.get(name).ok_or_else(|| {
            SqlSrvError::ConfigError(format!(
                "the connection '{name}' is not configured in the connections table"
            ))
        })?;
        RawCredentials {
            host: entry.host.clone(),
            instance: entry.instance.clone(),
            port: entry.port.as_ref().map(PortValue::to_text),
            database: entry.database.clone(),
            username: entry.username.clone(),
            password: entry.password.clone(),
            charset: entry.charset.clone(),
            login_timeout: entry.login_timeout.map(|secs| secs.to_string()),
        }
        .resolve("ConnectionDescriptor::from_named_config()")
    }

    /// `sqlsrv:Server=<host>[,<port>][\<instance>];Database=<database>`
    #[must_use]
    pub fn dsn(&self) -> String {
        let mut dsn = format!("{DSN_PREFIX}:Server={}", self.host);
        if let Some(port) = self.port {
            dsn.push(',');
            dsn.push_str(&port.to_string());
        }
        if let Some(instance) = &self.instance {
            dsn.push('\\');
            dsn.push_str(instance);
        }
        dsn.push_str(";Database=");
        dsn.push_str(&self.database);
        dsn
    }

    /// The DSN followed by `;LoginTimeout=<seconds>`.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "{};LoginTimeout={}",
            self.dsn(),
            self.login_timeout.as_secs()
        )
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The port to actually dial.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    #[must_use]
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub fn charset(&self) -> Encoding {
        self.charset
    }

    #[must_use]
    pub fn login_timeout(&self) -> Duration {
        self.login_timeout
    }
}

/// Fluent builder for [`ConnectionDescriptor`].
#[derive(Debug, Clone)]
pub struct ConnectionDescriptorBuilder {
    raw: RawCredentials,
    charset: Encoding,
    login_timeout: Duration,
}

impl ConnectionDescriptorBuilder {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            raw: RawCredentials {
                host: Some(host.into()),
                database: Some(database.into()),
                username: Some(username.into()),
                password: Some(password.into()),
                ..RawCredentials::default()
            },
            charset: Encoding::default(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.raw.port = port.map(|p| p.to_string());
        self
    }

    #[must_use]
    pub fn instance(mut self, instance: Option<String>) -> Self {
        self.raw.instance = instance;
        self
    }

    #[must_use]
    pub fn charset(mut self, charset: Encoding) -> Self {
        self.charset = charset;
        self
    }

    #[must_use]
    pub fn login_timeout(mut self, login_timeout: Duration) -> Self {
        self.login_timeout = login_timeout;
        self
    }

    /// # Errors
    ///
    /// Returns `SqlSrvError::MissingCredential` if a required field is blank.
    pub fn build(self) -> Result<ConnectionDescriptor, SqlSrvError> {
        let mut descriptor = self.raw.resolve("ConnectionDescriptorBuilder::build()")?;
        descriptor.charset = self.charset;
        descriptor.login_timeout = self.login_timeout;
        Ok(descriptor)
    }
}

/// Source-independent intermediate form before validation.
#[derive(Debug, Clone, Default)]
struct RawCredentials {
    host: Option<String>,
    instance: Option<String>,
    port: Option<String>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    charset: Option<String>,
    login_timeout: Option<String>,
}

impl RawCredentials {
    fn resolve(self, source_name: &'static str) -> Result<ConnectionDescriptor, SqlSrvError> {
        let present = |value: Option<String>, field: &'static str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or(SqlSrvError::MissingCredential { source_name, field })
        };
        let required = |value: Option<String>, field: &'static str| {
            present(value, field).map(|v| v.trim().to_string())
        };

        let host = required(self.host, "host")?;
        let database = required(self.database, "database")?;
        let username = required(self.username, "username")?;
        // passwords go to the server verbatim
        let password = present(self.password, "password")?;

        let port = self.port.and_then(|p| {
            let parsed = p.trim().parse::<u16>().ok();
            if parsed.is_none() && !p.trim().is_empty() {
                tracing::debug!(port = %p, "ignoring non-numeric port");
            }
            parsed
        });
        let instance = self
            .instance
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());
        let charset = self
            .charset
            .as_deref()
            .map_or_else(Encoding::default, Encoding::parse_lenient);
        let login_timeout = self
            .login_timeout
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map_or(DEFAULT_LOGIN_TIMEOUT, Duration::from_secs);

        Ok(ConnectionDescriptor {
            host,
            port,
            instance,
            database,
            username,
            password,
            charset,
            login_timeout,
        })
    }
}

/// A port written either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    fn to_text(&self) -> String {
        match self {
            PortValue::Number(n) => n.to_string(),
            PortValue::Text(s) => s.clone(),
        }
    }
}

/// One entry of the connection-configuration table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionEntry {
    #[serde(default, alias = "server")]
    pub host: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub port: Option<PortValue>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default, alias = "user")]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub login_timeout: Option<u64>,
}

/// Named connection entries, read from JSON shaped like
/// `{"connections": {"sales": {"host": "...", ...}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectionTable {
    #[serde(default)]
    connections: HashMap<String, ConnectionEntry>,
}

impl ConnectionTable {
    /// # Errors
    ///
    /// Returns `SqlSrvError::ConfigError` if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, SqlSrvError> {
        serde_json::from_str(json)
            .map_err(|e| SqlSrvError::ConfigError(format!("invalid connections table: {e}")))
    }

    /// # Errors
    ///
    /// Returns `SqlSrvError::ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlSrvError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SqlSrvError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ConnectionEntry) {
        self.connections.insert(name.into(), entry);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConnectionEntry> {
        self.connections.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }
}

/// Where a session's credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Inline(HashMap<String, String>),
    Environment(String),
    Named { table: ConnectionTable, name: String },
}

impl CredentialSource {
    /// Resolve to the logical connection name and its descriptor.
    ///
    /// Named entries register under their entry name, environment sources
    /// under `env:<PREFIX>`, inline maps under `inline:<user>@<dsn>`.
    ///
    /// # Errors
    ///
    /// Propagates the resolver errors of the chosen source.
    pub fn resolve(&self) -> Result<(String, ConnectionDescriptor), SqlSrvError> {
        match self {
            CredentialSource::Inline(map) => {
                let descriptor = ConnectionDescriptor::from_inline_map(map)?;
                let name = format!("inline:{}@{}", descriptor.username(), descriptor.dsn());
                Ok((name, descriptor))
            }
            CredentialSource::Environment(prefix) => {
                let descriptor = ConnectionDescriptor::from_environment_prefix(prefix)?;
                Ok((format!("env:{prefix}"), descriptor))
            }
            CredentialSource::Named { table, name } => {
                let descriptor = ConnectionDescriptor::from_named_config(table, name)?;
                Ok((name.clone(), descriptor))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn inline_minimal_dsn() {
        let map = inline(&[
            ("host", "db1"),
            ("database", "Sales"),
            ("user", "sa"),
            ("password", "x"),
        ]);
        let descriptor = ConnectionDescriptor::from_inline_map(&map).unwrap();
        assert_eq!(descriptor.dsn(), "sqlsrv:Server=db1;Database=Sales");
        assert_eq!(descriptor.effective_port(), 1433);
        assert_eq!(descriptor.charset(), Encoding::Utf8);
    }

    #[test]
    fn port_precedes_instance() {
        let map = inline(&[
            ("host", "db1"),
            ("database", "Sales"),
            ("user", "sa"),
            ("password", "x"),
            ("port", "1433"),
            ("instance", "SQLEXPRESS"),
        ]);
        let descriptor = ConnectionDescriptor::from_inline_map(&map).unwrap();
        assert_eq!(
            descriptor.dsn(),
            "sqlsrv:Server=db1,1433\\SQLEXPRESS;Database=Sales"
        );
        assert_eq!(
            descriptor.connection_string(),
            "sqlsrv:Server=db1,1433\\SQLEXPRESS;Database=Sales;LoginTimeout=10"
        );
    }

    #[test]
    fn non_numeric_port_and_blank_instance_are_dropped() {
        let map = inline(&[
            ("server", " db1 "),
            ("database", "Sales"),
            ("username", "sa"),
            ("password", "x"),
            ("port", "abc"),
            ("instance", "  "),
        ]);
        let descriptor = ConnectionDescriptor::from_inline_map(&map).unwrap();
        assert_eq!(descriptor.dsn(), "sqlsrv:Server=db1;Database=Sales");
    }

    #[test]
    fn instance_without_port() {
        let descriptor = ConnectionDescriptor::builder("db1", "Sales", "sa", "x")
            .instance(Some("SQLEXPRESS".into()))
            .build()
            .unwrap();
        assert_eq!(descriptor.dsn(), "sqlsrv:Server=db1\\SQLEXPRESS;Database=Sales");
    }

    #[test]
    fn blank_required_field_is_named() {
        let map = inline(&[("host", "db1"), ("database", "  "), ("user", "sa")]);
        let err = ConnectionDescriptor::from_inline_map(&map).unwrap_err();
        assert!(matches!(
            err,
            SqlSrvError::MissingCredential {
                field: "database",
                ..
            }
        ));
    }

    #[test]
    fn environment_prefix_keys() {
        let env: HashMap<String, String> = inline(&[
            ("APP_SQLSRV_NAME", "db2"),
            ("APP_SQLSRV_PORT", "1500"),
            ("APP_SQLSRV_DATABASE", "Hr"),
            ("APP_SQLSRV_USER", "reader"),
            ("APP_SQLSRV_PASS", "pw"),
            ("APP_SQLSRV_CHARSET", "binary"),
        ]);
        let descriptor =
            ConnectionDescriptor::from_env_lookup("APP", |key| env.get(key).cloned()).unwrap();
        assert_eq!(descriptor.dsn(), "sqlsrv:Server=db2,1500;Database=Hr");
        assert_eq!(descriptor.charset(), Encoding::Binary);

        let err = ConnectionDescriptor::from_env_lookup("OTHER", |key| env.get(key).cloned())
            .unwrap_err();
        assert!(matches!(err, SqlSrvError::MissingCredential { field: "host", .. }));
    }

    #[test]
    fn named_config_accepts_aliases_and_numeric_port() {
        let table = ConnectionTable::from_json_str(
            r#"{"connections": {
                "sales": {"server": "db1", "port": 1433, "database": "Sales",
                          "user": "sa", "password": "x", "login_timeout": 3},
                "broken": {"host": "db1", "database": "Sales"}
            }}"#,
        )
        .unwrap();

        let descriptor = ConnectionDescriptor::from_named_config(&table, "sales").unwrap();
        assert_eq!(descriptor.dsn(), "sqlsrv:Server=db1,1433;Database=Sales");
        assert_eq!(descriptor.login_timeout(), Duration::from_secs(3));

        assert!(matches!(
            ConnectionDescriptor::from_named_config(&table, "broken"),
            Err(SqlSrvError::MissingCredential {
                field: "username",
                ..
            })
        ));
        assert!(matches!(
            ConnectionDescriptor::from_named_config(&table, "missing"),
            Err(SqlSrvError::ConfigError(_))
        ));
    }

    #[test]
    fn password_keeps_surrounding_spaces() {
        let map = inline(&[
            ("host", " db1 "),
            ("database", "Sales"),
            ("user", "sa"),
            ("password", "  p@ss  "),
        ]);
        let descriptor = ConnectionDescriptor::from_inline_map(&map).unwrap();
        assert_eq!(descriptor.password(), "  p@ss  ");
        assert_eq!(descriptor.host(), "db1");

        let map = inline(&[
            ("host", "db1"),
            ("database", "Sales"),
            ("user", "sa"),
            ("password", "   "),
        ]);
        assert!(matches!(
            ConnectionDescriptor::from_inline_map(&map),
            Err(SqlSrvError::MissingCredential {
                field: "password",
                ..
            })
        ));
    }

    #[test]
    fn blank_key_falls_back_to_alias() {
        let map = inline(&[
            ("host", "  "),
            ("server", "db2"),
            ("database", "Sales"),
            ("user", ""),
            ("username", "reader"),
            ("password", "x"),
        ]);
        let descriptor = ConnectionDescriptor::from_inline_map(&map).unwrap();
        assert_eq!(descriptor.host(), "db2");
        assert_eq!(descriptor.username(), "reader");
    }

    #[test]
    fn debug_output_hides_password() {
        let descriptor = ConnectionDescriptor::builder("db1", "Sales", "sa", "s3cret")
            .build()
            .unwrap();
        assert!(!format!("{descriptor:?}").contains("s3cret"));
    }
}
