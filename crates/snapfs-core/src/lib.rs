//! Read-only virtual filesystem over the snapshots of a content-addressed
//! backup repository.
//!
//! The crate is organised bottom-up: [`blob_set`] and [`cache`] work on blob
//! handles, [`repo`] defines what the filesystem needs from a repository,
//! [`vfs`] builds the browsable tree, and [`progress`] / [`walk`] report on
//! long traversals. [`dav`] serves the tree over WebDAV.

pub mod blob_set;
pub mod cache;
pub mod config;
pub mod dav;
pub mod progress;
pub mod repo;
pub mod snapshot;
pub mod vfs;
pub mod walk;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
