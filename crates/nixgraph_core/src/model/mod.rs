//! Core entity data types.
//!
//! # Responsibility
//! - Define identity, metadata, array, dimension and tagging entities.
//! - Keep per-entity invariants local to each type.
//!
//! # Invariants
//! - Cross-entity references are plain ids; containers resolve them.
//! - Equality of named entities is by id only.

pub mod block;
pub mod data_array;
pub mod dimension;
pub mod entity;
pub mod property;
pub mod section;
pub mod source;
pub mod tag;
pub mod value;
