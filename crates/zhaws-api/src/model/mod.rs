//! Wire models shared by commands, results and events.

mod address;
mod device;
mod entity;
mod group;
mod state;

pub use address::{AddressParseError, Ieee, Nwk};
pub use device::{
    DeviceInfo, DeviceJoinedInfo, DevicePairingStatus, EndpointNameInfo, ExtendedDeviceInfo,
    ExtendedDeviceInfoWithPairingStatus, RawDeviceInitializedInfo,
};
pub use entity::{
    ClusterHandlerInfo, ClusterInfo, EntityInfo, EntityKey, EntityOwner, EntityRef, ModelError,
    Platform,
};
pub use group::{GroupInfo, GroupMemberInfo, GroupMemberReference};
pub use state::{
    CoverState, EntityState, FanState, GenericState, HvacMode, LightState, LockState, OnOffState,
    ShadeState, ThermostatState,
};
