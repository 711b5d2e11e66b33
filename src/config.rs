use crate::core::{DbalError, Result};
use crate::driver::Options;
use once_cell::unsync::OnceCell;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Connection parameters, parsed from TOML or built in code.
///
/// Every key is optional in TOML; missing keys take the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// Explicit DSN; when set, the discrete host/port/database fields are not used to build one
    pub dsn: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
    pub collation: Option<String>,
    /// Driver name; read back from the session after connecting when absent
    pub driver: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Driver-specific connection options
    pub options: Options,
    /// Default options applied to every prepared statement
    pub query_options: Options,
    pub debug: bool,
    pub query_logs: bool,
    #[serde(skip)]
    resolved_dsn: OnceCell<String>,
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials {
            dsn: None,
            username: None,
            password: None,
            charset: Some("utf8mb4".to_string()),
            collation: Some("utf8mb4_unicode_ci".to_string()),
            driver: Some("mysql".to_string()),
            host: "127.0.0.1".to_string(),
            port: 3306,
            database: String::new(),
            options: Options::new(),
            query_options: Options::new(),
            debug: false,
            query_logs: false,
            resolved_dsn: OnceCell::new(),
        }
    }
}

impl Credentials {
    /// Parses credentials from a TOML document
    ///
    /// # Example
    ///
    /// ```
    /// let credentials = dbal::Credentials::from_toml_str("dsn = \"sqlite::memory:\"").unwrap();
    /// assert_eq!(credentials.dsn(), "sqlite::memory:");
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DbalError::Config(e.to_string()))
    }

    /// Returns the DSN.
    ///
    /// An explicit DSN is returned verbatim. Otherwise one is built from the
    /// driver, host, port, database and charset on first call and cached, so
    /// later changes to those fields do not alter it.
    pub fn dsn(&self) -> &str {
        if let Some(dsn) = &self.dsn {
            return dsn;
        }
        self.resolved_dsn.get_or_init(|| {
            format!(
                "{}:host={};port={};dbname={};charset={}",
                self.driver.as_deref().unwrap_or_default(),
                self.host,
                self.port,
                self.database,
                self.charset.as_deref().unwrap_or_default()
            )
        })
    }

    pub(crate) fn set_dsn(&mut self, dsn: &str) {
        self.dsn = Some(dsn.to_string());
        self.resolved_dsn = OnceCell::new();
    }

    /// Sets the charset; an empty collation becomes `<charset>_unicode_ci`
    pub(crate) fn set_charset(&mut self, charset: &str, collation: Option<&str>) {
        self.charset = Some(charset.to_string());
        self.collation = Some(match collation {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => format!("{}_unicode_ci", charset),
        });
    }
}

/// Loads credentials from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let credentials = dbal::load_credentials("database.toml").expect("Failed to load credentials");
/// println!("{:?}", credentials);
/// ```
pub fn load_credentials<P: AsRef<Path>>(path: P) -> Result<Credentials> {
    let content = fs::read_to_string(path)?;
    Credentials::from_toml_str(&content)
}
