//! CLI commands

pub mod collect;
pub mod inspect;
