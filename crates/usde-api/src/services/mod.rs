//! # Services
//!
//! Logic that spans more than one store call or talks to the bank.
//!
//! - [`withdrawal`]: the Withdrawal Service.
//! - [`payout`]: the bank payout gateway and its simulation.
//! - [`sweeper`]: the periodic sweep over locks, deposits and stakes.

pub mod payout;
pub mod sweeper;
pub mod withdrawal;
