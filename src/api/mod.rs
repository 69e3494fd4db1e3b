pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::call_account_method;
pub use server::{create_router, run_server};
pub use types::{AccountMethod, Response};
