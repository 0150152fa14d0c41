pub mod config;
pub mod duration;
pub mod help;
pub mod logging;
pub mod model;
pub mod template;

pub const APP_NAME: &str = "bb8";

pub use config::{ConfigError, RawConfig};
pub use model::{
    Argument, ArgumentId, Auth, Command, Config, Group, Host, HostId, HostRef, Item, Settings,
};
pub use template::{Segment, Template, TemplateError};
