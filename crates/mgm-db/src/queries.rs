//! Database query functions organized by table.

pub mod campaigns;
pub mod evidence;
pub mod idempotency;
pub mod referrals;
pub mod tokens;
