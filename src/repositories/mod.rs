//! Persistence collaborators used by the fulfillment engine.
//!
//! Every method takes the connection it should run on, so the same call works
//! against the pool or inside an open `DatabaseTransaction`.

pub mod order_repository;
pub mod product_repository;
pub mod reception_repository;

pub use order_repository::OrderRepository;
pub use product_repository::{NewProduct, ProductRepository};
pub use reception_repository::ReceptionRepository;
