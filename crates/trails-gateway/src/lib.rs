pub mod error;
pub mod records;
pub mod router;
pub mod server;
pub mod state;

pub use server::GatewayServer;
