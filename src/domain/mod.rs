pub mod errors;
pub mod ids;
pub mod interfaces;
pub mod models;
pub mod repositories;
