mod health;
mod workflows;

pub use health::*;
pub use workflows::*;
