pub mod access;
pub mod chunk;
pub mod format;
pub mod resolver;

pub use access::{Access, AccessPolicy};
pub use chunk::{ChunkedOutput, chunk, chunk_output};
pub use format::{FormatError, format_command};
pub use resolver::{Invocation, Rejection, Scope, resolve};
