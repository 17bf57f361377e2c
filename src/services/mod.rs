pub mod emails;
pub mod mailer;
pub mod password;
pub mod validation;

pub mod token_codec;
pub use token_codec::{AccessToken, TokenCodec, TokenError};

pub mod refresh_ledger;
pub use refresh_ledger::{LedgerError, RefreshLedger, Rotation};

pub mod scheduler;
pub use scheduler::Scheduler;

pub mod account_service;
pub mod account_service_impl;
pub use account_service::{
    AccountError, AccountService, AccountView, Actor, AuthenticatedSession, CreateAccountRequest,
    RefreshTokenView, RegisterRequest, ResetPasswordRequest, UpdateAccountRequest,
};
pub use account_service_impl::{AccountSettings, SeaOrmAccountService};
