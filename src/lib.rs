pub mod calendar;
pub mod compactor;
pub mod config;
pub mod context;
pub mod desk;
pub mod engine;
pub mod inventory;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod resolver;
