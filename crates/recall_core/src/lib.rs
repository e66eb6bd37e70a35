pub mod accounts;
pub mod activity;
pub mod calendar;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod ports;
pub mod problems;
pub mod review;
pub mod session;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use accounts::{AccountService, AccountUpdate};
pub use activity::ActivityService;
pub use calendar::{Calendar, Clock, SystemClock};
pub use credentials::{CredentialError, CredentialManager, HashingCost};
pub use domain::{Activity, HeatmapDay, Problem, ProblemPage, ReviewOutcome, User};
pub use error::{ServiceError, ServiceResult};
pub use ports::{DatabaseService, PortError, PortResult};
pub use problems::{ProblemInput, ProblemPatch, ProblemService};
pub use review::ReviewEngine;
pub use session::{SessionTokenService, TokenError};
pub use validation::{ValidationError, ValidationPipeline};
