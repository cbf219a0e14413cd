pub mod approval;
pub mod audit;
pub mod auth;
pub mod evidence;
pub mod order;
pub mod payment;
pub mod settings;
