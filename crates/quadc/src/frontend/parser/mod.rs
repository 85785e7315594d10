//! Line-shape recognition

mod parser;

pub use parser::{Line, LineParser};
