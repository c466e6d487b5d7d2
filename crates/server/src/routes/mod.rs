mod health;
mod sessions;
pub mod sse;
mod ws;

pub use health::*;
pub use sessions::*;
pub use ws::*;
