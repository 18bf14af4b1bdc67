pub mod config;
pub mod container;
pub mod disk;
pub mod error;
pub mod facade;
pub mod image;
pub mod logger;
pub mod parser;
pub mod preflight;
pub mod resource;
pub mod runner;
pub mod vm;

pub use error::{ErrorKind, OperationError};
pub use facade::ResourceFacade;
pub use parser::{Listing, SkippedRow};
pub use resource::{ContainerRecord, ContainerState, ImageRecord, VmRecord, VmState};
pub use runner::{CommandResult, CommandRunner, CommandSpec, ProcessHandle, SystemRunner};

pub type Result<T> = std::result::Result<T, OperationError>;
