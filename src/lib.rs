pub mod captcha;
pub mod config;
pub mod diff;
pub mod encoder;
pub mod error;
pub mod gpa;
pub mod login;
pub mod monitor;
pub mod notify;
pub mod parser;
pub mod requests;
pub mod scores;
pub mod scraping_context;
pub mod store;
mod text_manipulators;

pub use config::{AccountIndex, Credentials, MonitorConfig};
pub use error::MonitorError;
pub use monitor::ScoreMonitor;
pub use scores::{CreditGpaSummary, ScoreRecord, ScoreSnapshot};
