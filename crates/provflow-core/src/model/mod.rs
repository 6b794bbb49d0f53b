//! データモデル

mod plan_file;
mod provider;
mod resource;
mod settings;

pub use plan_file::*;
pub use provider::*;
pub use resource::*;
pub use settings::*;
