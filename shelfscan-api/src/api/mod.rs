//! HTTP API handlers

pub mod batch;
pub mod events;
pub mod health;
pub mod scan;

pub use batch::batch_routes;
pub use events::event_routes;
pub use health::health_routes;
pub use scan::scan_routes;
