pub mod action;
pub mod coords;
pub mod guard;
pub mod parser;
pub mod render;

pub use action::{Action, ActionMap, MouseButton, ScrollDirection};
pub use guard::{DuplicateGuard, GuardVerdict};
pub use parser::{parse_response, ParsedResponse};
