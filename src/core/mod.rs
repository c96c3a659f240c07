pub mod bridge;

pub use crate::domain::model::{DeliveryReport, DeliveryRequest, SyncRequest, UploadedFile};
pub use crate::domain::ports::{ObjectStore, ProcessRunner, RemoteConnector, RemoteSession};
pub use crate::utils::error::Result;
