pub mod auth;
pub mod media;
pub mod points;
pub mod report;
pub mod user;
