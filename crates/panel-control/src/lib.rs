//! Control context: toolbar buttons, login flow and playlist loading.  Talks
//! to the presentation context only through the bridge.

pub mod api;
pub mod controller;
pub mod host;
pub mod store;
pub mod terminal;

pub use api::{ApiClient, ApiError, VkApi};
pub use controller::{extract_access_token, ControlEvent, Controller, MirroredControlState};
pub use host::{icon_path, Button, Host, Icon, Panel, TabId, Tabs, Toolbar};
pub use store::{ConfigStore, FileStore, MemoryStore, StoreError, ACCESS_TOKEN_KEY};
