//! Client-side support: the line-command parser plus (with the `net`
//! feature) typed sessions against the naming server and storage nodes.

mod parser;

#[cfg(feature = "net")]
mod session;

pub use parser::{parse_command, ParseError};

#[cfg(feature = "net")]
pub use session::{ClientError, DataSession, NamingSession, RequestOutcome};
