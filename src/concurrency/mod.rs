// Admission control for outbound calls
// Author: kelexine (https://github.com/kelexine)

pub mod admission;
pub mod models;

pub use admission::{AdmissionPermit, ConcurrencyAdmission, QueuedHandle};
pub use models::{ConcurrencyConfig, ConcurrencyStatus, Priority};
