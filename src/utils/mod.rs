pub mod category;
pub mod cookie;
pub mod jwt;
pub mod password;
pub mod validation;

pub use password::{hash_password, verify_password};
