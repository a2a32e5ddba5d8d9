pub mod resolver;

pub use resolver::{DeviceResolver, ResolvedDevice, DEFAULT_DEVICE, VIRTUAL_DEVICE_FALLBACK_RATE};
