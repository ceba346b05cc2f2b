pub mod error;
pub mod runner;

pub use error::ProcessError;
pub use runner::{Drained, ExitStatus, ProcessCommand, StreamingProcess};
