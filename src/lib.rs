pub mod app;
pub mod client;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod errors;
pub mod fallback;
pub mod handlers;
pub mod models;
pub mod service;
pub mod state;
pub mod storage;

pub use app::router;
pub use client::VisitorClient;
pub use config::Config;
pub use fallback::LocalCounter;
pub use service::VisitorService;
pub use state::AppState;
pub use storage::Store;
