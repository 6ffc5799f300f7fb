pub mod app_state;
pub mod commands;
pub mod domain;
pub mod infrastructure;
pub mod interface;
pub mod usecase;
