//! Virtual file namespace for oxide-360
//!
//! Hosts the device registry that content packages mount into, and the
//! container codec used to stamp and read package headers.

pub mod container;
pub mod device;

pub use container::{
    data_directory, is_container_magic, read_header, ContainerDevice, ContainerHeader,
    ExecutionInfo, HEADER_LEN, THUMB_MAX_LEN,
};
pub use device::{Device, DeviceRegistry};
