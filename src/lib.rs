//! Shared library behind the `gateway` and `worker` binaries: identifiers,
//! configuration, the relational and coordination stores, scheduling, auth,
//! and the two binaries' route/handler modules.

pub mod auth;
pub mod config;
pub mod coordination;
pub mod db;
pub mod gateway;
pub mod ids;
pub mod scheduler;
pub mod worker;
