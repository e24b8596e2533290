use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{Graph, Query};
use tracing::{debug, info, warn};

use crate::store::GraphStore;
use crate::upsert::{Param, Statement, Upsert, NODE_LABEL, SCHEMA_STATEMENTS};

/// Graph store backed by a live Neo4j instance.
pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", uri))?;
        info!(uri, "Connected to Neo4j");
        Ok(Self::new(graph))
    }

    /// Create the uniqueness constraint and type index.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA_STATEMENTS {
            self.graph
                .run(Query::new(statement.to_string()))
                .await
                .with_context(|| format!("Failed to apply schema statement: {}", statement))?;
        }
        debug!("Neo4j schema ready");
        Ok(())
    }
}

fn to_query(statement: Statement) -> Query {
    let mut query = Query::new(statement.cypher);
    for (name, value) in statement.params {
        query = match value {
            Param::Str(s) => query.param(name, s),
            Param::Float(f) => query.param(name, f),
            Param::Int(i) => query.param(name, i),
        };
    }
    query
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn entity_names(&self) -> Result<Vec<String>> {
        let query = Query::new(format!("MATCH (c:{NODE_LABEL}) RETURN DISTINCT c.name AS name"));
        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to query existing entity names")?;

        let mut names = Vec::new();
        while let Some(row) = result.next().await? {
            // null names are skipped
            names.extend(row.get::<String>("name"));
        }
        Ok(names)
    }

    /// One transaction per call: a batch lands completely or not at all.
    async fn apply(&self, upserts: &[Upsert]) -> Result<()> {
        if upserts.is_empty() {
            return Ok(());
        }

        let queries: Vec<Query> = upserts.iter().map(|u| to_query(u.statement())).collect();

        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to open Neo4j transaction")?;

        if let Err(e) = txn.run_queries(queries).await {
            if let Err(rollback) = txn.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            return Err(e).context("Failed to apply upserts");
        }

        txn.commit().await.context("Failed to commit upserts")?;
        Ok(())
    }
}
