pub mod connection;
pub mod dispatcher;
pub mod presence;

pub use dispatcher::{Dispatcher, Published};
