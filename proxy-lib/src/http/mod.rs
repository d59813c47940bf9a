pub mod forward;
pub mod headers;
pub mod observe;
pub mod response;
