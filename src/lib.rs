//! # argocd-appsource
//!
//! Kubernetes operator that turns `AppSource` resources into Argo CD
//! Applications. Each AppSource namespace is mapped to an Argo CD Project
//! through admin-defined project templates; the project is created on demand
//! and allow-listed for the new Application's destination.

pub mod config;
pub mod error;
pub mod logging;
pub mod operator;

pub use error::{Error, Result};
pub use operator::{AppSource, AppSourceSpec, AppSourceStatus, ReconciliationEngine};
