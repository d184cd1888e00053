//! Command implementations for the pkflate CLI.

pub mod codec;
pub mod create;
pub mod extract;
pub mod list;
pub mod test;

pub use codec::{cmd_compress, cmd_decompress};
pub use create::{CreateOptions, cmd_append, cmd_create};
pub use extract::{ExtractOptions, cmd_extract};
pub use list::cmd_list;
pub use test::cmd_test;

/// Result type shared by all commands.
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;
