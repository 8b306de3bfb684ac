pub mod anomaly;
pub mod config;
pub mod error;
pub mod result;
pub mod table;
pub mod time;

pub use anomaly::*;
pub use config::Config;
pub use error::*;
pub use result::*;
pub use table::DataTable;
pub use time::{parse_period, TimeRange};
