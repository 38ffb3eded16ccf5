pub mod error;
pub mod history;
pub mod product;
pub mod service;
pub mod stakeholder;
pub mod utils;
