pub mod api;
pub mod config;
pub mod dispatch;
pub mod flow;
pub mod humanize;
pub mod media;
pub mod observability;
pub mod selection;
pub mod transport;
pub mod users;
