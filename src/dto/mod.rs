pub mod admin;
pub mod health;
pub mod rounds;
pub mod validation;
