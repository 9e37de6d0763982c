// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod app_name;
mod id;
mod image_name;

pub use app_name::{AppName, AppNameError, MAX_APP_NAME_LEN};
pub use id::{ContainerId, Id, ImageId};
pub use image_name::{DEFAULT_NAMESPACE, ImageName};
