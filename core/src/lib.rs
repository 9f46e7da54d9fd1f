pub mod error;
mod messaging;
pub mod normalize;
mod record;
mod sensor;

pub use error::ValidationError;
pub use messaging::*;
pub use record::*;
pub use sensor::*;

pub static CORE_VERSION: &str = env!("CARGO_PKG_VERSION");
