pub mod audit;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod objects;
pub mod routes;

pub use routes::create_router;
