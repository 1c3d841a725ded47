pub mod config;
pub mod driver;
pub mod error;
pub mod host;
pub mod manager;
pub mod message;
pub mod pool;
pub mod template;
pub mod util;

pub use error::{ImError, ImResult};
pub use host::{Host, HostState};
pub use manager::{InformationManager, ManagerHandle, MonitorCommands};
pub use message::{Message, MessageType};
pub use pool::{HostPool, MemoryHostPool};
pub use template::Template;
