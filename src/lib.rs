pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod facility;
pub mod limits;
pub mod model;
pub mod observability;
pub mod request;
pub mod store;
pub mod time_range;
pub mod validator;
pub mod wal;
pub mod wire;
