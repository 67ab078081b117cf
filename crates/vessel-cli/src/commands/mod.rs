//! Subcommand implementations.

pub mod centerline_length;
pub mod correspond;
pub mod deform;
pub mod deviation;
pub mod export_surface;
pub mod info;
pub mod merge;
pub mod radius;
pub mod swap;
