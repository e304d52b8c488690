pub mod api;
pub mod config;
pub mod dispatch;
pub mod graph;
pub mod humanize;
pub mod observability;
pub mod registry;
