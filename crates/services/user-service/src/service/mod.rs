//! Service layer - business logic.

mod account_service;

pub use account_service::{AccountManager, AccountService};

#[cfg(any(test, feature = "test-utils"))]
pub use account_service::MockAccountService;
