//! Filesystem core
//!
//! Everything here operates on a database session and never touches the
//! connection pool or the kernel bridge directly — those live one layer up,
//! in [`crate::pool`] and [`crate::bridge`]/[`crate::dispatcher`].

pub mod data;
pub mod lifecycle;
pub mod metadata;
pub mod path;
pub mod stat;
