pub mod consts;
pub mod directories;
pub mod spinner;

pub use consts::*;
