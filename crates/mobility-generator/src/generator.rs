use crate::factory::{Clock, EventFactory, SystemClock};
use bytes::Bytes;
use mobility_config::GeneratorConfig;
use mobility_core::{MobilityError, Result, SharedTransport};
use mobility_shutdown::ShutdownListener;
use mobility_types::MobilityEvent;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// 每生成多少条事件输出一次进度
const PROGRESS_LOG_EVERY: u64 = 10;

/// 生成器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Idle,
    Running,
    /// 被 `stop()` 或外部关闭信号中断
    Stopped,
    /// 达到 `max_events`
    Completed,
    /// `enabled = false`，未生成任何事件
    Disabled,
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeneratorState::Idle => "idle",
            GeneratorState::Running => "running",
            GeneratorState::Stopped => "stopped",
            GeneratorState::Completed => "completed",
            GeneratorState::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// 成功发布的事件数
    pub emitted: u64,
    /// 发布失败（已丢弃）的事件数
    pub failed: u64,
    pub state: GeneratorState,
}

/// 停止句柄
///
/// 可在任意线程调用 `stop()`；正在休眠的生成器会被立即唤醒。
#[derive(Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wakeup.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// 事件生成器
///
/// 单线程循环：生成 → 以 vehicle_id 为键发布 → 休眠。发布失败只记录日志，
/// 不重试也不缓存。传输客户端由调用方提供和关闭。
pub struct EventGenerator {
    transport: SharedTransport,
    config: GeneratorConfig,
    rng: StdRng,
    clock: Arc<dyn Clock>,
    state: GeneratorState,
    stop: StopHandle,
}

impl EventGenerator {
    pub fn new(transport: SharedTransport, config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            transport,
            config,
            rng,
            clock: Arc::new(SystemClock),
            state: GeneratorState::Idle,
            stop: StopHandle::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        info!("Event generator stop requested");
        self.stop.stop();
    }

    /// 运行生成循环直到完成或停止
    ///
    /// 生成器不可重启：只能从 `Idle` 状态调用一次。
    pub async fn run(&mut self, mut shutdown: ShutdownListener) -> Result<RunSummary> {
        if self.state != GeneratorState::Idle {
            return Err(MobilityError::InvalidState(format!(
                "generator already {}",
                self.state
            )));
        }

        if !self.config.enabled {
            info!("Event generation is DISABLED (generator.enabled=false)");
            self.state = GeneratorState::Disabled;
            return Ok(RunSummary {
                emitted: 0,
                failed: 0,
                state: self.state,
            });
        }

        let interval = self.config.interval();
        info!(
            topic = %self.config.topic,
            interval_ms = self.config.interval_ms,
            transport = %self.transport.name(),
            "Starting event generator"
        );
        if self.config.is_bounded() {
            info!(
                "Will generate {} events then exit (bounded mode)",
                self.config.max_events
            );
        } else {
            info!("Event generator is running and generating events continuously");
        }

        self.state = GeneratorState::Running;
        let wakeup = self.stop.wakeup.clone();
        let mut emitted: u64 = 0;
        let mut failed: u64 = 0;

        let final_state = loop {
            if self.stop.is_stopped() || shutdown.is_shutdown() {
                break GeneratorState::Stopped;
            }
            if self.config.is_bounded() && emitted >= self.config.max_events {
                break GeneratorState::Completed;
            }

            match self.emit_one().await {
                Ok(event) => {
                    emitted += 1;
                    info!(
                        event_id = %event.event_id,
                        vehicle_id = %event.vehicle_id,
                        event_type = %event.event_type,
                        "Generated and sent event"
                    );
                    if emitted % PROGRESS_LOG_EVERY == 0 {
                        info!("Generated {} events so far...", emitted);
                    }
                }
                Err(e) => {
                    failed += 1;
                    error!(error = %e, transient = e.is_transient(), "Error generating event");
                }
            }

            let stop_requested = wakeup.notified();
            tokio::pin!(stop_requested);
            stop_requested.as_mut().enable();
            if self.stop.is_stopped() {
                break GeneratorState::Stopped;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut stop_requested => {
                    debug!("Sleep interrupted by stop request");
                    break GeneratorState::Stopped;
                }
                signal = shutdown.recv() => {
                    warn!(?signal, "Event generator interrupted");
                    break GeneratorState::Stopped;
                }
            }
        };

        self.state = final_state;
        match final_state {
            GeneratorState::Completed => info!(
                "Event generator completed - generated {} events (bounded mode)",
                emitted
            ),
            _ => info!("Event generator stopped after generating {} events", emitted),
        }

        Ok(RunSummary {
            emitted,
            failed,
            state: final_state,
        })
    }

    async fn emit_one(&mut self) -> Result<MobilityEvent> {
        let event = EventFactory::produce(&mut self.rng, self.clock.now());
        let payload = event.to_json()?;

        self.transport
            .publish(&self.config.topic, event.key(), Bytes::from(payload))
            .await?;
        Ok(event)
    }
}
