pub mod config;
pub mod meeting;
pub mod poll;
pub mod suggest;
pub mod sweep;
