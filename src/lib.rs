mod aggregate;
mod compose;
mod config;
mod dispatch;
mod error;
mod params;
mod path;
mod select;
mod simulator;
mod space;
mod sweep;
mod sweep_log;
mod utils;
mod workload;

pub use aggregate::*;
pub use compose::*;
pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use params::*;
pub use path::*;
pub use select::*;
pub use simulator::*;
pub use space::*;
pub use sweep::*;
pub use sweep_log::*;
pub use utils::*;
pub use workload::*;
