pub mod approvals;
pub mod evidence;
pub mod orders;
pub mod payments;
pub mod public;
pub mod settings;
