//! Fleet Lifecycle - module template resolution and change propagation
//!
//! The control plane holds `Tenant` resources that request modules and
//! `ModuleTemplate` resources that describe one installable version of a
//! module per release channel. This crate resolves every requested module to
//! exactly one authorized template, guards against downgrades across channel
//! changes, and turns changes on dependent objects into work items for the
//! owning tenant.

pub mod api;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod reconcile;
pub mod templatelookup;
pub mod tenant;
pub mod utils;
pub mod watch;
