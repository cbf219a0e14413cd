pub mod clock;
pub mod error;
pub mod hashing;
pub mod i18n;
pub mod locks;
pub mod money;
