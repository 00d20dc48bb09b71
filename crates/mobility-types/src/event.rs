use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 参考点纬度（纽约市中心）
pub const REFERENCE_LATITUDE: f64 = 40.7128;

/// 参考点经度
pub const REFERENCE_LONGITUDE: f64 = -74.0060;

/// 坐标抖动总宽度（±0.05 度）
pub const COORDINATE_JITTER: f64 = 0.1;

/// 最大速度
pub const MAX_SPEED: f64 = 120.0;

/// 车辆编号前缀
pub const VEHICLE_ID_PREFIX: &str = "VH-";

/// 车辆编号取值范围 [0, VEHICLE_POOL_SIZE)
pub const VEHICLE_POOL_SIZE: u32 = 1000;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    LocationUpdate,
    SpeedChange,
    TrafficAlert,
    Parking,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::LocationUpdate,
        EventType::SpeedChange,
        EventType::TrafficAlert,
        EventType::Parking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LocationUpdate => "LOCATION_UPDATE",
            EventType::SpeedChange => "SPEED_CHANGE",
            EventType::TrafficAlert => "TRAFFIC_ALERT",
            EventType::Parking => "PARKING",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 车辆遥测事件
///
/// 创建后不可变。`vehicle_id` 同时作为发布时的分区键。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobilityEvent {
    pub event_id: Uuid,
    pub timestamp: NaiveDateTime,
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub event_type: EventType,
}

impl MobilityEvent {
    /// 分区键
    pub fn key(&self) -> &str {
        &self.vehicle_id
    }

    pub fn vehicle_id_for(index: u32) -> String {
        format!("{}{}", VEHICLE_ID_PREFIX, index)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
