pub mod prelude;

pub mod accounts;
pub mod refresh_tokens;
