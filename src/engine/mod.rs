//! Balance bookkeeping core: accrual math, ledger writes, availability
//! projection and the request state machine. Everything here is careful
//! about two things that the HTTP layer is not allowed to get wrong:
//! decimal precision (two places, half away from zero) and the ledger
//! identity closing = opening + accrued + adjusted - taken.

pub mod accrual;
pub mod days;
pub mod error;
pub mod ledger;
pub mod projector;
pub mod workflow;
