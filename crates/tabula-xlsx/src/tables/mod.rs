//! Interning tables shared by every sheet of a document.

pub mod shared_strings;
pub mod styles;

pub use shared_strings::SharedStringTable;
pub use styles::StyleManager;
