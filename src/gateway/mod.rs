//! Gateway server implementation

mod pages;
mod router;
mod server;

pub use router::{AppState, create_router};
pub use server::Gateway;
