//! Desktop file-system helpers: revealing a file in the platform file manager, recursive and
//! atomic file operations, durable flushing, content-type sniffing and locating the running
//! executable.

mod exe;
pub use self::exe::*;

mod mime;
pub use self::mime::*;

mod ops;
pub use self::ops::*;

pub mod reveal;
pub use self::reveal::{RevealChain, show_in_folder};

#[cfg(test)]
mod tests;
