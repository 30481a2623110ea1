use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{AnyPool, Row};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::identity::Fingerprint;

const LIST_SERVERS: &str = "SELECT fingerprint, host, enabled FROM servers ORDER BY fingerprint";

/// A peer node of the federation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub fingerprint: Fingerprint,
    pub host: String,
    pub enabled: bool,
}

/// Read access to the federation directory
#[async_trait]
pub trait NetworkStorage: Send + Sync {
    /// All known nodes, ordered by fingerprint, one entry per fingerprint
    async fn list_nodes(&self) -> Result<BTreeMap<Fingerprint, NetworkNode>>;
}

/// Federation directory backed by the `servers` table
#[derive(Debug, Clone)]
pub struct SqlNetworkStorage {
    pool: AnyPool,
}

impl SqlNetworkStorage {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NetworkStorage for SqlNetworkStorage {
    async fn list_nodes(&self) -> Result<BTreeMap<Fingerprint, NetworkNode>> {
        let rows = sqlx::query(LIST_SERVERS).fetch_all(&self.pool).await?;

        let mut nodes = BTreeMap::new();
        for row in rows {
            let raw: String = row.try_get("fingerprint")?;
            let host: String = row.try_get("host")?;
            let enabled: i64 = row.try_get("enabled")?;

            let fingerprint = match Fingerprint::parse(&raw) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    warn!("Skipping server {}: {}", host, e);
                    continue;
                }
            };

            nodes.insert(
                fingerprint.clone(),
                NetworkNode {
                    fingerprint,
                    host,
                    enabled: enabled != 0,
                },
            );
        }

        debug!("Loaded {} federation nodes", nodes.len());
        Ok(nodes)
    }
}

/// Open the connection pool for the federation registry.
///
/// Called once at node startup; the pool is handed to whichever components
/// need it and closed on shutdown.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<AnyPool> {
    install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url())
        .await?;

    info!(
        "Connected to {} registry {} on {}:{}",
        config.driver, config.dbname, config.host, config.port
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry(rows: &[(&str, &str, i64)]) -> SqlNetworkStorage {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE servers (fingerprint TEXT NOT NULL, host TEXT NOT NULL, enabled INTEGER NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        for (fingerprint, host, enabled) in rows {
            sqlx::query("INSERT INTO servers (fingerprint, host, enabled) VALUES (?, ?, ?)")
                .bind(fingerprint.to_string())
                .bind(host.to_string())
                .bind(*enabled)
                .execute(&pool)
                .await
                .unwrap();
        }

        SqlNetworkStorage::new(pool)
    }

    #[tokio::test]
    async fn test_ordered_by_fingerprint() {
        let b2 = "B2".repeat(20);
        let a1 = "A1".repeat(20);
        let storage = registry(&[(b2.as_str(), "beta.example.com", 1), (a1.as_str(), "alpha.example.com", 0)]).await;

        let nodes = storage.list_nodes().await.unwrap();
        let order: Vec<&str> = nodes.keys().map(Fingerprint::as_str).collect();
        assert_eq!(order, vec![a1.as_str(), b2.as_str()]);

        let alpha = &nodes[&Fingerprint::parse(&a1).unwrap()];
        assert_eq!(alpha.host, "alpha.example.com");
        assert!(!alpha.enabled);
        assert!(nodes[&Fingerprint::parse(&b2).unwrap()].enabled);
    }

    #[tokio::test]
    async fn test_fingerprints_are_uppercased() {
        let lower = "c3".repeat(20);
        let storage = registry(&[(lower.as_str(), "gamma.example.com", 1)]).await;

        let nodes = storage.list_nodes().await.unwrap();
        let (fingerprint, node) = nodes.iter().next().unwrap();
        assert_eq!(fingerprint.as_str(), "C3".repeat(20));
        assert_eq!(node.fingerprint, *fingerprint);
    }

    #[tokio::test]
    async fn test_malformed_rows_skipped() {
        let good = "D4".repeat(20);
        let storage = registry(&[
            ("not-a-fingerprint", "bad.example.com", 1),
            (good.as_str(), "delta.example.com", 1),
        ])
        .await;

        let nodes = storage.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(nodes.contains_key(&Fingerprint::parse(&good).unwrap()));
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let storage = registry(&[]).await;
        assert!(storage.list_nodes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_propagates() {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let storage = SqlNetworkStorage::new(pool);
        assert!(matches!(
            storage.list_nodes().await,
            Err(crate::error::Error::FederationQuery(_))
        ));
    }
}
