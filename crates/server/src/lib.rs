//! HTTP surface for the ethcache proxy: router assembly and the bearer-token
//! authentication middleware. The binary in `main.rs` wires these to the
//! core components.

pub mod middleware;
pub mod router;

pub use router::create_app;
