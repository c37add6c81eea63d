pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod stream;
pub mod tickets;

pub use routes::create_router;
pub use stream::StreamMessage;
