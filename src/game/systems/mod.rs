pub mod auto_click;
pub mod fusion;
pub mod logging;
pub mod spawn;

pub use auto_click::*;
pub use fusion::*;
pub use logging::*;
pub use spawn::*;
