pub mod alert;
pub mod event;

pub use alert::{Alert, AlertType, ClientAlert};
pub use event::{DetailsSource, EmergencyEvent};
