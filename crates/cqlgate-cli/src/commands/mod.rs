//! `cqlgate` subcommands.

pub mod audit;
pub mod check;
pub mod explain;
pub mod serve;
