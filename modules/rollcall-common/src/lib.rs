pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Result, RollcallError};
pub use notify::{NotifyBackend, RegistrationChange, RegistrationChanged, StatusChanged};
pub use types::*;
