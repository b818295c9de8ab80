pub mod error;
pub mod notification;
pub mod outcome;
pub mod target;
pub mod type_registry;

pub use error::{RegistryError, ValidationError};
pub use notification::{Notification, NotificationBuilder};
pub use outcome::{DeliveryFailure, NETWORK_ERROR_CODE, SendResult, TOO_MANY_REQUESTS};
pub use target::RoutingTarget;
pub use type_registry::{NotificationTypeDefinition, NotificationTypeRegistry};
