//! `bloodbank` operator CLI: argument parsing and operation dispatch.

pub mod args;
pub mod context;

pub use args::{Cli, Command, DonorCommand, Operation, RequestsCommand, UserCommand};
pub use context::{OperatorContext, Report};
