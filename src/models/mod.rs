pub mod message;
pub mod script;
