pub mod api;
pub mod config;
pub mod dto;
pub mod seed;
