pub mod channel;
pub mod config_manager;
pub mod context;
pub mod error;
pub mod logging;
pub mod records;
pub mod traits;
pub mod types;
pub mod validation;

pub use channel::*;
pub use config_manager::*;
pub use context::*;
pub use error::*;
pub use logging::init_tracing;
pub use records::*;
pub use traits::*;
pub use types::*;
pub use validation::*;
