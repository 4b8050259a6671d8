pub mod apply;
pub mod config;
pub mod generate;
pub mod run;

pub use apply::ApplyArgs;
pub use config::{ConfigAction, ConfigArgs};
pub use generate::GenerateArgs;
pub use run::RunArgs;
