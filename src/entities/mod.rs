pub mod prelude;

pub mod subscriptions;
pub mod users;
pub mod videos;
pub mod watch_history;
