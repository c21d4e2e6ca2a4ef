//! Reference-data lookup used while validating rows
//!
//! Flows live in the database; priorities come from the static alias table in
//! the validator. Tests use `StaticFlowLookup` so no database is required.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::queries;
use crate::types::FlowRef;

/// Resolves flow names to flow/unit ids
#[async_trait]
pub trait FlowLookup: Send + Sync {
    /// Flows whose name exactly matches one of `names`. Unknown names are
    /// simply absent from the result.
    async fn find_flows_by_names(&self, names: &[String]) -> Result<Vec<FlowRef>>;
}

/// Flow lookup backed by the `flow` table
pub struct PgFlowLookup {
    pool: PgPool,
}

impl PgFlowLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlowLookup for PgFlowLookup {
    async fn find_flows_by_names(&self, names: &[String]) -> Result<Vec<FlowRef>> {
        queries::flow::find_flows_by_names(&self.pool, names).await
    }
}

/// Fixed in-memory flow table
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticFlowLookup {
    flows: Vec<FlowRef>,
}

#[cfg(test)]
impl StaticFlowLookup {
    pub fn new(flows: Vec<FlowRef>) -> Self {
        Self { flows }
    }
}

#[cfg(test)]
#[async_trait]
impl FlowLookup for StaticFlowLookup {
    async fn find_flows_by_names(&self, names: &[String]) -> Result<Vec<FlowRef>> {
        Ok(self
            .flows
            .iter()
            .filter(|f| names.contains(&f.name))
            .cloned()
            .collect())
    }
}
