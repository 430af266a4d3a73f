// jobctl Core - Job lifecycle domain, controller & ports
// NO infrastructure dependencies (storage, HTTP and executor live in adapter crates)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};
