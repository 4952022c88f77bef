pub mod api;
pub mod catalog;
pub mod config;
pub mod coords;
pub mod engine;
pub mod feeds;
pub mod models;
pub mod normalize;
pub mod popup;
pub mod session;
pub mod store;
pub mod style;
pub mod style_doc;
pub mod template_engine;
