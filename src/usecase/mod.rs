pub mod controller;
pub mod generator;
pub mod session_store;
pub mod store_service;

#[cfg(test)]
mod tests_session_store;
