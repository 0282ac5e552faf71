// Request/response data and the error taxonomy

pub mod compilation;
pub mod errors;
