pub mod classify;
pub mod config;
pub mod counters;
pub mod error;
pub mod flags;
pub mod random;
pub mod responder;
pub mod sender;
pub mod stats;
pub mod traffic;

pub use classify::*;
pub use config::*;
pub use counters::*;
pub use error::*;
pub use flags::*;
pub use random::*;
pub use responder::*;
pub use sender::*;
pub use stats::*;
pub use traffic::*;
