pub mod adapter;
pub mod convert;
pub mod error;
pub mod handler;
pub mod send;

pub use adapter::DiscordAdapter;
pub use error::DiscordError;
pub use send::SerenityTransport;
