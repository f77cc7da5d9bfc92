pub mod build;
pub mod catalog;
pub mod status;
