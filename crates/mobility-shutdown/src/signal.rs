use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// 关闭信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM - 优雅关闭
    Term,

    /// SIGINT - Ctrl+C
    Interrupt,

    /// 手动触发
    Manual,
}

/// 信号处理器
///
/// 第一个触发的信号生效，之后的触发被忽略。
/// 触发之后创建的监听器也能立即观察到关闭状态。
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<Option<ShutdownSignal>>>,
}

impl SignalHandler {
    pub fn new() -> (Self, ShutdownListener) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                shutdown_tx: Arc::new(tx),
            },
            ShutdownListener { rx },
        )
    }

    /// 触发关闭，返回本次调用是否生效
    pub fn trigger(&self, signal: ShutdownSignal) -> bool {
        self.shutdown_tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(signal);
                true
            } else {
                false
            }
        })
    }

    /// 手动触发关闭
    pub fn trigger_shutdown(&self) {
        if self.trigger(ShutdownSignal::Manual) {
            info!("Manual shutdown triggered");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.shutdown_tx.borrow().is_some()
    }

    /// 创建新的监听器
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.shutdown_tx.subscribe(),
        }
    }

    /// 等待系统信号并广播给所有监听器
    #[cfg(unix)]
    pub async fn wait_for_system_signal(&self) -> ShutdownSignal {
        use signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                    return self.wait_for_ctrl_c().await;
                }
            };

        let received = tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                ShutdownSignal::Term
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
                ShutdownSignal::Interrupt
            }
        };
        self.trigger(received);
        received
    }

    /// 等待系统信号（非 unix 平台）
    #[cfg(not(unix))]
    pub async fn wait_for_system_signal(&self) -> ShutdownSignal {
        self.wait_for_ctrl_c().await
    }

    async fn wait_for_ctrl_c(&self) -> ShutdownSignal {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
        self.trigger(ShutdownSignal::Interrupt);
        ShutdownSignal::Interrupt
    }
}

/// 关闭监听器
#[derive(Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    /// 永远不会触发的监听器
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    pub fn is_shutdown(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// 等待关闭信号
    ///
    /// 所有 `SignalHandler` 被 drop 且从未触发时，永远挂起。
    pub async fn recv(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.rx.borrow_and_update() {
                return signal;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
