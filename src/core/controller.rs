//! 流会话控制器：主控循环
//!
//! 后台任务独占 WorkflowModel：消费命令（Start / Cancel / ToggleStepDetails），
//! 驱动 传输 -> 解码器 -> 归约器，并在每个事件后通过 watch 通道发布快照。
//! 瞬时传输故障按 RecoveryEngine 的指数退避重连；complete / error 事件为终态。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Sleep};

use crate::core::session_supervisor::Generation;
use crate::core::{
    RecoveryAction, RecoveryEngine, SessionStatus, SessionSupervisor, StepId, StreamError,
    WorkflowModel, WorkflowSnapshot,
};
use crate::transport::{ByteStream, EventTransport};
use crate::workflow::{reducer, SseDecoder, WorkflowEvent};

type ConnectFuture = Pin<Box<dyn Future<Output = Result<ByteStream, StreamError>> + Send>>;

/// 从 Handle 发往控制器的命令
#[derive(Debug)]
enum Command {
    Start(String),
    Cancel,
    ToggleStepDetails(StepId),
    /// 屏障：此前发出的命令都处理完后应答
    Barrier(oneshot::Sender<()>),
}

/// 控制器构建器：传输必需，其余可选
pub struct WorkflowController {
    transport: Arc<dyn EventTransport>,
    recovery: RecoveryEngine,
    idle_timeout: Option<Duration>,
}

impl WorkflowController {
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self {
            transport,
            recovery: RecoveryEngine::default(),
            idle_timeout: None,
        }
    }

    /// 设置重连策略
    pub fn with_recovery(mut self, recovery: RecoveryEngine) -> Self {
        self.recovery = recovery;
        self
    }

    /// 设置数据块之间的最长静默时间；超时按瞬时故障处理
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout.filter(|d| !d.is_zero());
        self
    }

    /// 启动后台任务，返回 Handle；所有 Handle 被丢弃后任务退出
    pub fn spawn(self) -> WorkflowHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(WorkflowSnapshot::default());

        let actor = Actor {
            transport: self.transport,
            recovery: self.recovery,
            idle_timeout: self.idle_timeout,
            cmd_rx,
            snapshot_tx,
            model: WorkflowModel::new(),
            supervisor: SessionSupervisor::new(),
            invocation: None,
            link: Link::Idle,
        };
        tokio::spawn(actor.run());

        WorkflowHandle {
            cmd_tx,
            snapshot_rx,
        }
    }
}

/// 对外的模型访问器：只读快照 + 三个受控操作；可廉价 Clone
#[derive(Clone)]
pub struct WorkflowHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<WorkflowSnapshot>,
}

impl WorkflowHandle {
    /// 以 user_input 开始一次全新的工作流运行；已有会话进行中时被忽略
    pub fn start(&self, user_input: impl Into<String>) {
        self.send(Command::Start(user_input.into()));
    }

    /// 中止当前会话（含待重连的计时器）；可重复调用
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    pub fn toggle_step_details(&self, id: StepId) {
        self.send(Command::ToggleStepDetails(id));
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// 订阅快照变化（UI 在变化时重新渲染）
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshot_rx.clone()
    }

    /// 等待此前发出的所有命令被控制器处理
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Barrier(tx));
        let _ = rx.await;
    }

    /// 等待会话进入稳定状态（空闲 / 完成 / 失败），返回当时的快照
    pub async fn wait_until_settled(&self) -> WorkflowSnapshot {
        self.flush().await;
        let mut rx = self.snapshot_rx.clone();
        let settled = rx
            .wait_for(|s| s.status.is_settled())
            .await
            .map(|s| s.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    fn send(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::warn!("Workflow controller has stopped; command dropped");
        }
    }
}

/// 一次逻辑调用：输入按值捕获，重连时原样复用
struct Invocation {
    input: Arc<str>,
    attempts: u32,
}

/// 当前连接所处阶段；各阶段持有的 future / 流 / 计时器被丢弃即等于中止
enum Link {
    Idle,
    Connecting {
        generation: Generation,
        connect: ConnectFuture,
    },
    Streaming {
        generation: Generation,
        body: ByteStream,
        decoder: SseDecoder,
        first_chunk_seen: bool,
        /// 数据块之间的静默截止时间；只在收到数据块时顺延
        idle_deadline: Option<Pin<Box<Sleep>>>,
    },
    Backoff {
        timer: Pin<Box<Sleep>>,
    },
}

enum Transition {
    Connected(Generation, Result<ByteStream, StreamError>),
    Chunk(Generation, Option<Result<Bytes, StreamError>>),
    IdleTimeout(Generation),
    BackoffElapsed,
}

/// 等待当前连接的下一个变化；Idle 时永远挂起。被 select! 丢弃不会丢失进度
async fn next_transition(link: &mut Link) -> Transition {
    match link {
        Link::Idle => std::future::pending().await,
        Link::Connecting {
            generation,
            connect,
        } => {
            let result = connect.as_mut().await;
            Transition::Connected(*generation, result)
        }
        Link::Streaming {
            generation,
            body,
            idle_deadline,
            ..
        } => {
            let generation = *generation;
            match idle_deadline {
                Some(deadline) => tokio::select! {
                    item = body.next() => Transition::Chunk(generation, item),
                    _ = deadline.as_mut() => Transition::IdleTimeout(generation),
                },
                None => Transition::Chunk(generation, body.next().await),
            }
        }
        Link::Backoff { timer } => {
            timer.as_mut().await;
            Transition::BackoffElapsed
        }
    }
}

struct Actor {
    transport: Arc<dyn EventTransport>,
    recovery: RecoveryEngine,
    idle_timeout: Option<Duration>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    snapshot_tx: watch::Sender<WorkflowSnapshot>,
    model: WorkflowModel,
    supervisor: SessionSupervisor,
    invocation: Option<Invocation>,
    link: Link,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                transition = next_transition(&mut self.link) => {
                    self.on_transition(transition);
                }
            }
        }
        self.supervisor.shutdown();
        tracing::debug!("Workflow controller stopped");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start(input) => self.start(input),
            Command::Cancel => self.cancel(),
            Command::ToggleStepDetails(id) => {
                if self.model.toggle_step_details(id) {
                    self.publish();
                } else {
                    tracing::debug!(step = %id, "Toggle for unknown step ignored");
                }
            }
            Command::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }

    fn start(&mut self, input: String) {
        if self.model.status.is_in_flight() {
            tracing::warn!(status = ?self.model.status, "Workflow already running; start ignored");
            return;
        }
        self.supervisor.cancel();
        self.link = Link::Idle;
        self.model.reset();
        self.invocation = Some(Invocation {
            input: Arc::from(input),
            attempts: 0,
        });
        tracing::info!("Starting workflow run");
        self.connect();
    }

    fn cancel(&mut self) {
        if self.invocation.is_none() && matches!(self.link, Link::Idle) {
            tracing::debug!("Cancel with no active session");
            return;
        }
        self.supervisor.cancel();
        self.link = Link::Idle;
        self.invocation = None;
        self.model.status = SessionStatus::Idle;
        self.model.error_message = None;
        tracing::info!("Workflow cancelled");
        self.publish();
    }

    fn connect(&mut self) {
        let Some(invocation) = self.invocation.as_mut() else {
            return;
        };
        invocation.attempts += 1;
        let (generation, token) = self.supervisor.begin();
        let transport = Arc::clone(&self.transport);
        let input = Arc::clone(&invocation.input);
        tracing::info!(
            attempt = invocation.attempts,
            max_attempts = self.recovery.max_attempts(),
            "Connecting to workflow stream"
        );

        let connect = async move {
            tokio::select! {
                result = transport.open(&input) => result,
                _ = token.cancelled() => Err(StreamError::Interrupted("connect cancelled".to_string())),
            }
        };
        self.link = Link::Connecting {
            generation,
            connect: Box::pin(connect),
        };
        self.model.status = SessionStatus::Connecting;
        self.publish();
    }

    fn on_transition(&mut self, transition: Transition) {
        match transition {
            Transition::Connected(generation, result) => {
                if !self.supervisor.is_current(generation) {
                    tracing::debug!("Discarding connection of superseded session");
                    self.link = Link::Idle;
                    return;
                }
                match result {
                    Ok(body) => {
                        tracing::debug!("Workflow stream connected");
                        self.link = Link::Streaming {
                            generation,
                            body,
                            decoder: SseDecoder::new(),
                            first_chunk_seen: false,
                            idle_deadline: self
                                .idle_timeout
                                .map(|limit| Box::pin(tokio::time::sleep(limit))),
                        };
                    }
                    Err(err) => self.on_transport_failure(err),
                }
            }
            Transition::Chunk(generation, item) => {
                if !self.supervisor.is_current(generation) {
                    tracing::debug!("Discarding bytes of superseded session");
                    return;
                }
                match item {
                    Some(Ok(bytes)) => {
                        self.extend_idle_deadline();
                        self.on_bytes(&bytes);
                    }
                    Some(Err(err)) => self.on_transport_failure(err),
                    None => self.on_stream_end(),
                }
            }
            Transition::IdleTimeout(generation) => {
                if let (true, Some(limit)) =
                    (self.supervisor.is_current(generation), self.idle_timeout)
                {
                    self.on_transport_failure(StreamError::Idle(limit));
                }
            }
            Transition::BackoffElapsed => {
                if self.invocation.is_some() {
                    // 后端会为同一输入从头重放，丢弃上一次尝试的残留结果
                    self.model.clear_run();
                    self.connect();
                } else {
                    self.link = Link::Idle;
                }
            }
        }
    }

    fn extend_idle_deadline(&mut self) {
        if let (
            Link::Streaming {
                idle_deadline: Some(deadline),
                ..
            },
            Some(limit),
        ) = (&mut self.link, self.idle_timeout)
        {
            deadline.as_mut().reset(Instant::now() + limit);
        }
    }

    fn on_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let decoded = match &mut self.link {
            Link::Streaming {
                decoder,
                first_chunk_seen,
                ..
            } => {
                let first = !*first_chunk_seen;
                *first_chunk_seen = true;
                (first, decoder.push(bytes))
            }
            _ => return,
        };

        let (first, items) = decoded;
        if first {
            self.model.status = SessionStatus::Streaming;
            tracing::info!("Workflow stream receiving data");
            self.publish();
        }
        for item in items {
            match item {
                Ok(event) => self.on_event(&event),
                Err(err) => tracing::warn!(error = %err, "Skipping undecodable event"),
            }
        }
        if self.model.status.is_terminal() {
            self.finish_session();
        }
    }

    fn on_stream_end(&mut self) {
        let link = std::mem::replace(&mut self.link, Link::Idle);
        if let Link::Streaming { decoder, .. } = link {
            match decoder.finish() {
                Some(Ok(event)) => self.on_event(&event),
                Some(Err(err)) => tracing::warn!(error = %err, "Skipping undecodable trailing event"),
                None => {}
            }
        }
        if self.model.status.is_terminal() {
            self.finish_session();
        } else {
            self.on_transport_failure(StreamError::PrematureEnd);
        }
    }

    fn on_event(&mut self, event: &WorkflowEvent) {
        tracing::debug!(kind = event.kind(), "Workflow event");
        let was_terminal = self.model.status.is_terminal();
        reducer::apply(&mut self.model, event, Utc::now());
        if was_terminal {
            return;
        }
        match event {
            WorkflowEvent::WorkflowCompleted { .. } => {
                tracing::info!(
                    steps = self.model.steps.len(),
                    answers = self.model.answers.len(),
                    "Workflow completed"
                );
            }
            WorkflowEvent::WorkflowFailed { message } => {
                tracing::warn!(message = %message, "Workflow reported failure");
            }
            _ => {}
        }
        self.publish();
    }

    /// 终态：关闭连接，不再自动重启
    fn finish_session(&mut self) {
        self.supervisor.cancel();
        self.link = Link::Idle;
        self.invocation = None;
    }

    fn on_transport_failure(&mut self, err: StreamError) {
        let Some(invocation) = self.invocation.as_ref() else {
            self.link = Link::Idle;
            return;
        };
        match self.recovery.handle(&err, invocation.attempts) {
            RecoveryAction::Retry { delay } => {
                self.model.retry_count += 1;
                tracing::warn!(
                    error = %err,
                    retry = self.model.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Transport failure; scheduling reconnect"
                );
                self.link = Link::Backoff {
                    timer: Box::pin(tokio::time::sleep(delay)),
                };
                self.model.status = SessionStatus::Connecting;
            }
            RecoveryAction::Fail(message) => {
                tracing::error!(error = %err, "Workflow stream failed");
                self.model.fail(message);
                self.finish_session();
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.model.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
