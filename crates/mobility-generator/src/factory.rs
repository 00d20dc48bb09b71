use chrono::{Local, NaiveDateTime};
use mobility_types::{
    EventType, MobilityEvent, COORDINATE_JITTER, MAX_SPEED, REFERENCE_LATITUDE,
    REFERENCE_LONGITUDE, VEHICLE_POOL_SIZE,
};
use rand::Rng;
use uuid::Builder;

/// 时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 本地挂钟时间
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 固定时间，用于测试
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// 事件工厂
///
/// 纯函数：相同的随机源状态和时间产生相同的事件，事件 ID 也取自同一随机源。
/// 每个字段独立抽取，不模拟车队的持续状态。
pub struct EventFactory;

impl EventFactory {
    pub fn produce<R: Rng + ?Sized>(rng: &mut R, now: NaiveDateTime) -> MobilityEvent {
        let event_id = Builder::from_random_bytes(rng.gen()).into_uuid();
        let vehicle_id = MobilityEvent::vehicle_id_for(rng.gen_range(0..VEHICLE_POOL_SIZE));
        let latitude = REFERENCE_LATITUDE + (rng.gen::<f64>() - 0.5) * COORDINATE_JITTER;
        let longitude = REFERENCE_LONGITUDE + (rng.gen::<f64>() - 0.5) * COORDINATE_JITTER;
        let speed = rng.gen::<f64>() * MAX_SPEED;
        let event_type = EventType::ALL[rng.gen_range(0..EventType::ALL.len())];

        MobilityEvent {
            event_id,
            timestamp: now,
            vehicle_id,
            latitude,
            longitude,
            speed,
            event_type,
        }
    }
}
