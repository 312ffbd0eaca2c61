//! Process-level helpers shared by the controller binary.

pub mod bootstrap;
