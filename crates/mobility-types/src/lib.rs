pub mod event;

pub use event::{
    EventType, MobilityEvent, COORDINATE_JITTER, MAX_SPEED, REFERENCE_LATITUDE,
    REFERENCE_LONGITUDE, VEHICLE_ID_PREFIX, VEHICLE_POOL_SIZE,
};
