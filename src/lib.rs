//! cluster-gitops: GitOps repository management and IAM authenticator
//! trust setup for Kubernetes clusters.
//!
//! The `gitops` module keeps a cluster's configuration in a git repository
//! and drives Flux against it. The `iamauth` module provisions the IAM
//! authenticator CA and configuration, driven by the controller loop in
//! `controller`.

pub mod cancel;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod gitops;
pub mod iamauth;
pub mod providers;
pub mod telemetry;

pub use crate::error::{Error, Result};
