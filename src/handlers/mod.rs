// HTTP request handlers module

pub mod compile;
pub mod health;
