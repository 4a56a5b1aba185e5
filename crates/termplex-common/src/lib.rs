pub mod debug;
pub mod errors;
pub mod id;

pub use debug::{debug_enabled, init_debug_logging, DEBUG_ENV_VAR};
pub use errors::{ManifestError, ShellError, TermplexError};
pub use id::{new_id, short};

pub type Result<T> = std::result::Result<T, TermplexError>;
