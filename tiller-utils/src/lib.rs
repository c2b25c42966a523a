//! Shared low-level utilities for the tiller command framework.

pub mod input;

pub use input::CursorMark;
pub use input::InputCursor;
pub use input::InputError;
