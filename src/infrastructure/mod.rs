pub mod automation_api;
pub mod page_driver;

pub use automation_api::{AutomationApi, AutomationApiError, BoundSession, ObservedElement};
pub use page_driver::PageDriver;
