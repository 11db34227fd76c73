#![allow(dead_code)]

pub mod fixtures;
pub mod memory;

pub use fixtures::{add_member, setup, TestCtx};
pub use memory::{InMemoryStore, FAILING_VALUE};
