//! CLI command implementations
//!
//! This module contains all CLI command handlers, organized by category:
//! - `drivers`: Driver commands (list, transform, steps)
//! - `validate`: Driver and config validation
//! - `schema`: JSON schema output
//! - `util`: Shared option parsing and I/O helpers

pub mod drivers;
pub mod schema;
pub mod util;
pub mod validate;

pub use drivers::{cmd_list, cmd_steps, cmd_transform};
pub use schema::cmd_schema;
pub use validate::cmd_validate;
