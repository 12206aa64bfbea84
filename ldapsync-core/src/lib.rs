#![doc = "ldapsync-core: core logic library for ldapsync."]

//! This crate contains the data model and the synchronisation pipeline that mirrors the
//! university directory into the thesis application's store. Directory and store
//! bindings that need network or disk access live in the `ldapsync` crate.
//!
//! # Usage
//! Build a [`synchronise::SynchroniseConfig`], pick a [`contract::DirectorySource`] and a
//! [`contract::Repository`], and call [`synchronise::synchronise`].

pub mod adapter;
pub mod config;
pub mod contract;
pub mod counter;
pub mod dn;
pub mod error;
pub mod memory;
pub mod reconcile;
pub mod record;
pub mod shadow;
pub mod synchronise;
