//! Pre-flight cost estimates per upstream operation.
//!
//! Heuristics only. Once a response reports its real cost the limiter
//! reconciles against that instead.

use std::collections::HashMap;

use sync_core::{Error, Result};

/// Upstream operations the sync issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Single product lookup
    ProductFetch,
    /// One page of a category listing
    ProductList,
    /// Bulk async export
    BulkOperation,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Self::ProductFetch, Self::ProductList, Self::BulkOperation];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProductFetch => "product_fetch",
            Self::ProductList => "product_list",
            Self::BulkOperation => "bulk_operation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn default_cost(&self) -> f64 {
        match self {
            Self::ProductFetch => 10.0,
            Self::ProductList => 50.0,
            Self::BulkOperation => 100.0,
        }
    }
}

/// Operation → estimated points.
#[derive(Debug, Clone)]
pub struct CostTable {
    costs: HashMap<Operation, f64>,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            costs: Operation::ALL
                .into_iter()
                .map(|op| (op, op.default_cost()))
                .collect(),
        }
    }
}

impl CostTable {
    /// Builds the table from defaults plus named overrides.
    pub fn with_overrides(overrides: &HashMap<String, f64>) -> Result<Self> {
        let mut table = Self::default();
        for (name, cost) in overrides {
            let op = Operation::from_name(name)
                .ok_or_else(|| Error::config(format!("unknown operation in cost overrides: {}", name)))?;
            if !(*cost > 0.0) {
                return Err(Error::config(format!("cost for {} must be positive", name)));
            }
            table.costs.insert(op, *cost);
        }
        Ok(table)
    }

    pub fn estimate(&self, op: Operation) -> f64 {
        self.costs
            .get(&op)
            .copied()
            .unwrap_or_else(|| op.default_cost())
    }
}
