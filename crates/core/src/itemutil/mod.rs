//! Item helpers shared by the scheduler and plugins: key syntax,
//! update-interval arithmetic and value rendering.

mod key;
mod nextcheck;
mod value;

pub use key::parse_key;
pub use nextcheck::{DEFAULT_REFRESH_UNSUPPORTED, MAX_DELAY, NextcheckPolicy, get_nextcheck, parse_delay};
pub use value::Value;
