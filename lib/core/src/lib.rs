//! Core types and utilities shared by the gatehouse crates.
//!
//! This crate provides the rootcause-backed `Result` alias and the opaque
//! `SessionId` type used to key visitor sessions.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId};
