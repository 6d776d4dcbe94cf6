pub mod admin;
pub mod code;
pub mod health;
pub mod scan;
