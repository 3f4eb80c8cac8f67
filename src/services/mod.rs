pub mod rewrite_service;

pub use rewrite_service::{Refiner, RewriteOutput, RewriteService};
