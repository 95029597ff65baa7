pub mod engine;
pub mod verdict;
pub mod window;

pub use engine::*;
pub use verdict::*;
pub use window::*;
