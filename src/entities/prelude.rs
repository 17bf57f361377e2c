pub use super::accounts::Entity as Accounts;
pub use super::refresh_tokens::Entity as RefreshTokens;
