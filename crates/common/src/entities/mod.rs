pub mod accounts;
pub mod certificates;
pub mod restart_actions;
pub mod settings;
pub mod stored_certificates;
pub mod validations;

pub use accounts::Account;
pub use certificates::{Certificate, MAX_RENEW_INTERVAL_DAYS, StatusCode};
pub use restart_actions::{RestartAction, RestartKind};
pub use settings::{AcmeEnvironment, Settings};
pub use stored_certificates::StoredCertificate;
pub use validations::{Challenge, DnsChallenge, HttpChallenge, HttpResponder, ValidationMethod};
