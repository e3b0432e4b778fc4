//! Ownership storage shared by the file facade.

pub mod collection;
pub mod forest;

pub use collection::Collection;
pub use forest::Forest;
