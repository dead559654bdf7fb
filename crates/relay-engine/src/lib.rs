pub mod admin;
pub mod clock;
pub mod dedup;
pub mod filter;
pub mod normalize;
pub mod relay;
pub mod routing;
pub mod transport;

pub use admin::AdminCommand;
pub use clock::{Clock, ManualClock, SystemClock};
pub use relay::{Relay, RelayOptions, RelayOutcome, SkipReason};
pub use transport::Transport;
