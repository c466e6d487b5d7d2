mod analysis;
mod inputs;
mod session;
mod stage;

pub use analysis::*;
pub use inputs::*;
pub use session::*;
pub use stage::*;
