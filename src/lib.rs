// ABOUTME: Library module for the mkslides-server program.
// ABOUTME: Contains the configuration, workspace, invocation and protocol layers.

// Reexport modules
pub mod config;
pub mod errors;
pub mod generate;
pub mod invoker;
pub mod request;
pub mod result;
pub mod server;
pub mod slides_config;
pub mod utils;
pub mod workspace;

// Reexport common types and functions
pub use config::Config;
pub use errors::{ErrorKind, Result, SlidesError};
pub use generate::SlideGenerator;
pub use invoker::{BuildCommand, CancelToken, ExitOutcome, ProcessOutput};
pub use request::BuildRequest;
pub use result::{BuildError, BuildResult};
pub use server::McpServer;
pub use slides_config::{ConfigDefaults, EffectiveConfig};
pub use workspace::Workspace;
