pub mod cancel;
pub mod engine;
pub mod error;
pub mod result;
pub(crate) mod runner;
pub mod validate;
