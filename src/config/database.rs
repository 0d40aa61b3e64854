use anyhow::Result;
use std::env;

/// Which technology backs the persistence port. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    DynamoDb,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Postgres => "postgres",
            BackendKind::DynamoDb => "dynamodb",
            BackendKind::Memory => "memory",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "relational" => Some(BackendKind::Postgres),
            "dynamodb" | "dynamo" | "document" => Some(BackendKind::DynamoDb),
            "memory" | "in-memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DynamoConfig {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub table_prefix: String,
    pub create_tables: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub dynamodb: DynamoConfig,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        let raw_backend = env::var("DATABASE_TYPE").unwrap_or_else(|_| "postgres".to_string());
        let backend = BackendKind::parse(&raw_backend).ok_or_else(|| {
            anyhow::anyhow!(
                "Unsupported DATABASE_TYPE '{}', expected postgres, dynamodb or memory",
                raw_backend
            )
        })?;

        let url = env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty());
        if backend == BackendKind::Postgres && url.is_none() {
            return Err(anyhow::anyhow!(
                "DATABASE_URL environment variable must be set"
            ));
        }

        Ok(Self {
            backend,
            url,
            max_connections: super::parse_env("DB_MAX_CONNECTIONS", 10),
            min_connections: super::parse_env("DB_MIN_CONNECTIONS", 2),
            dynamodb: DynamoConfig {
                region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                endpoint_url: env::var("DYNAMODB_ENDPOINT_URL").ok(),
                table_prefix: env::var("DYNAMODB_TABLE_PREFIX")
                    .unwrap_or_else(|_| "civic_".to_string()),
                create_tables: super::parse_bool_env("DYNAMODB_CREATE_TABLES", false),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_aliases() {
        assert_eq!(BackendKind::parse("PostgreSQL"), Some(BackendKind::Postgres));
        assert_eq!(BackendKind::parse("document"), Some(BackendKind::DynamoDb));
        assert_eq!(BackendKind::parse("memory"), Some(BackendKind::Memory));
        assert_eq!(BackendKind::parse("mongo"), None);
    }
}
