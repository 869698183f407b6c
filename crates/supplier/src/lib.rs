//! Supplier API integration.
//!
//! Every upstream call goes through the shared cost limiter: the estimated
//! cost is reserved before the request and the response's cost extension
//! corrects the bucket afterwards.

pub mod catalog;
pub mod client;
pub mod config;
pub mod costs;
pub mod error;
pub mod sink;

pub use catalog::{CatalogExecutor, CatalogSource, PageInfo, ProductPage};
pub use client::{SupplierClient, SupplierResponse};
pub use config::SupplierConfig;
pub use costs::{CostTable, Operation};
pub use error::SupplierError;
pub use sink::{FileProductSink, ProductSink, UpsertCounts};
