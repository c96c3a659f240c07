// Domain layer: request/response models and the ports adapters implement.

pub mod model;
pub mod ports;
