pub mod config;
pub mod inspect;
pub mod process;

pub use config::{AnonymizeRule, Config};
pub use process::{convert_file, run};
