pub mod app;
pub mod auth;
pub mod config;
pub mod contacts;
pub mod db;
pub mod error;
pub mod mail;
pub mod memory;
pub mod profiles;
pub mod response;
pub mod state;
pub mod users;
pub mod validation;
