use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Storage behind the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    Postgres,
}

impl std::str::FromStr for BackendKind {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err("valid values: memory, postgres"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub backend: BackendKind,
    /// Connection string; only set for the postgres backend.
    #[serde(serialize_with = "serialize_redacted")]
    pub database_url: Option<String>,
    pub max_connections: usize,
    /// `None` disables the request body limit.
    pub http_body_limit_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            backend: BackendKind::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
        }
    }
}

/// Assemble a postgres connection string from `POSTGRES_*` variables read through `lookup`.
pub fn database_url_from_env(lookup: impl Fn(&str) -> Option<String>) -> String {
    let var = |name: &str, default: &str| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_string())
    };
    let user = var("POSTGRES_USER", "postgres");
    let password = var("POSTGRES_PASSWORD", "");
    let host = var("POSTGRES_HOST", "localhost");
    let port = var("POSTGRES_PORT", "5432");
    let database = var("POSTGRES_DB", "gaming_website");
    let sslmode = var("POSTGRES_SSLMODE", "disable");

    let mut url = match url::Url::parse(&format!("postgres://{host}:{port}/{database}")) {
        Ok(url) => url,
        // Fall back to the raw form and let the driver report the problem.
        Err(_) => {
            return format!(
                "postgres://{user}:{password}@{host}:{port}/{database}?sslmode={sslmode}"
            )
        }
    };
    let _ = url.set_username(&user);
    if !password.is_empty() {
        let _ = url.set_password(Some(&password));
    }
    url.query_pairs_mut().append_pair("sslmode", &sslmode);
    url.into()
}

/// Hide credentials before a connection string leaves the process.
pub fn redact_database_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("redacted"));
            }
            url.into()
        }
        Err(_) => "redacted".to_string(),
    }
}

fn serialize_redacted<S: serde::Serializer>(
    value: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(raw) => serializer.serialize_some(&redact_database_url(raw)),
        None => serializer.serialize_none(),
    }
}
