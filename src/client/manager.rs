// src/client/manager.rs

//! 连接生命周期管理模块。
//!
//! 本模块提供 `WsClientService`——整条逻辑连接的中枢协调者。它持有唯一的
//! 传输句柄，驱动心跳监控与重连控制，分发入站帧，并维护发送队列。
//!
//! 状态机的合法迁移：
//! - `Disconnected → Connecting`: 调用 `connect()`；
//! - `Connecting → Connected`: 传输打开成功（重置尝试计数、启动心跳、冲刷发送队列）；
//! - `Connecting → Failed`: 连接地址在同步校验阶段即被判定非法；
//! - `Connected → Reconnecting`: 非调用方发起的任何关闭，且配置启用了重连；
//! - `Connected → Disconnected`: 调用方发起 `disconnect()`；
//! - `Reconnecting → Connecting`: 重连计时器到期；
//! - `Reconnecting → Failed`: 尝试次数达到配置上限；
//! - 任意状态 `→ Disconnected`: `disconnect()` 总是立即生效，取消未到期的
//!   重连计时器并拆除心跳。
//!
//! 并发模型：所有核心状态只在一个派生的生命周期任务（事件循环）内被修改；
//! `connect()` / `send_text()` / `disconnect()` 通过命令通道与其通信，
//! 全部立即返回，结果经回调异步通知。

use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;
use uuid::Uuid;

use futures_util::{SinkExt, StreamExt};

use crate::client::heartbeat::{HeartbeatEvent, HeartbeatSchedule};
use crate::client::reconnect::{ReconnectController, ReconnectDecision};
use crate::client::transport::{self, ClientWsStream};
use crate::config::ClientConfig;
use crate::error::WsError;
use crate::events::{ClientCallbacks, SendOutcome};
use crate::message::{self, InboundFrame, ProbeFrame};
use crate::queue::{Enqueue, OutboundQueue};
use crate::state::ConnectionState;

/// 心跳超时强制断开时使用的 WebSocket 关闭码（应用自定义区间 4000-4999）。
/// 连接管理器据此把关闭归类为非调用方发起，从而触发重连策略。
pub const HEARTBEAT_TIMEOUT_CLOSE_CODE: u16 = 4000;

/// 调用方操作经命令通道送入生命周期任务。
enum Command {
    /// 发送一帧文本；结果经 `reply` 回传。
    Send {
        text: String,
        reply: oneshot::Sender<SendOutcome>,
    },
    /// 调用方请求断开连接。
    Disconnect {
        reason: Option<String>,
    },
}

/// 生命周期任务运行所需的共享上下文。
struct LifecycleContext {
    /// 连接描述符（构造后只读）。
    config: Arc<ClientConfig>,
    /// 应用层回调集合。
    callbacks: Arc<ClientCallbacks>,
    /// 当前连接状态的权威存储。
    state: Arc<RwLock<ConnectionState>>,
    /// 连接不可用期间的待发消息队列。
    queue: Arc<TokioMutex<OutboundQueue>>,
    /// 手动关闭标志：`disconnect()` 置位，关闭处理逻辑据此区分
    /// "调用方要求的关闭"与"需要重连的故障"。
    manual_close: Arc<AtomicBool>,
}

/// 打开传输阶段的结果。
enum OpenOutcome {
    /// 握手成功，进入连接阶段。
    Opened(Box<ClientWsStream>),
    /// 握手失败（瞬时错误，交由重连决策处理）。
    Failed(WsError),
    /// 等待握手期间收到断开请求。
    Aborted,
}

/// 连接阶段结束的原因。
enum ClosedBy {
    /// 调用方发起的关闭（含服务实例被丢弃）。
    Manual,
    /// 非调用方发起的关闭：网络故障、心跳超时或服务端主动关闭。
    /// `None` 表示对方正常关闭流，`Some` 携带具体的传输错误。
    Transport(Option<WsError>),
}

/// WebSocket 客户端连接服务。
///
/// 封装了与流式服务端交互的全部连接生命周期逻辑：连接建立与断开、
/// 心跳维持、断线重连、发送队列与入站帧分发。每个实例管理恰好一条
/// 逻辑连接，由调用方显式构造并持有——不存在进程级的隐式注册表。
#[derive(Debug)]
pub struct WsClientService {
    /// 连接描述符。
    config: Arc<ClientConfig>,
    /// 应用层回调集合。
    callbacks: Arc<ClientCallbacks>,
    /// 当前连接状态。
    state: Arc<RwLock<ConnectionState>>,
    /// 待发消息队列。
    queue: Arc<TokioMutex<OutboundQueue>>,
    /// 手动关闭标志。
    manual_close: Arc<AtomicBool>,
    /// 指向当前生命周期任务的命令通道；任务未运行时为 `None`。
    cmd_tx: Arc<TokioMutex<Option<mpsc::UnboundedSender<Command>>>>,
    /// 生命周期任务的句柄，用于 `connect()` 重入时取消旧任务。
    lifecycle_task_handle: Arc<TokioMutex<Option<JoinHandle<()>>>>,
}

impl WsClientService {
    /// 创建 `WsClientService` 的新实例。初始状态为 `Disconnected`，
    /// 在调用 `connect()` 之前不会产生任何网络活动。
    ///
    /// # 参数
    /// * `config` - 连接描述符（目标地址、凭证与调优参数）。
    /// * `callbacks` - 应用层回调集合。
    pub fn new(config: ClientConfig, callbacks: ClientCallbacks) -> Self {
        info!("[连接管理] WsClientService 正在初始化，目标地址: {}", config.url);
        let queue_capacity = config.outbound_queue_capacity;
        Self {
            config: Arc::new(config),
            callbacks: Arc::new(callbacks),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            queue: Arc::new(TokioMutex::new(OutboundQueue::new(queue_capacity))),
            manual_close: Arc::new(AtomicBool::new(false)),
            cmd_tx: Arc::new(TokioMutex::new(None)),
            lifecycle_task_handle: Arc::new(TokioMutex::new(None)),
        }
    }

    /// 发起连接。
    ///
    /// 同步校验连接地址后启动后台生命周期任务并立即返回；实际的连接
    /// 成败经 `on_state_change` 异步通知。地址非法属于终止性错误：
    /// 状态机进入 `Failed`，错误同时经 `on_error` 上报并作为返回值给出。
    /// 若之前的生命周期任务仍在运行，会先将其取消再启动新任务。
    pub async fn connect(&self) -> Result<(), WsError> {
        info!("[连接管理] connect 调用，目标 URL: {}", self.config.url);

        // 若已有生命周期任务在运行，先取消它（及其全部计时器）
        {
            let mut handle_guard = self.lifecycle_task_handle.lock().await;
            if let Some(handle) = handle_guard.take() {
                info!("[连接管理] 检测到之前的生命周期任务仍在运行，正在取消...");
                handle.abort();
                match handle.await {
                    Ok(_) => info!("[连接管理] 之前的生命周期任务已结束。"),
                    Err(e) if e.is_cancelled() => info!("[连接管理] 之前的生命周期任务已被取消。"),
                    Err(e) => warn!("[连接管理] 等待之前的生命周期任务结束时发生错误: {:?}", e),
                }
            }
            *self.cmd_tx.lock().await = None;
        }

        // 同步校验地址：失败是终止性错误，不进入重连
        if let Err(e) = self.config.connect_url() {
            error!("[连接管理] 连接地址校验失败: {}", e);
            Self::apply_transition(&self.state, &self.callbacks, ConnectionState::Connecting).await;
            Self::apply_transition(&self.state, &self.callbacks, ConnectionState::Failed).await;
            if let WsError::InvalidUrl(details) = &e {
                self.callbacks.emit_error(WsError::InvalidUrl(details.clone()));
            }
            return Err(e);
        }

        self.manual_close.store(false, Ordering::SeqCst);
        Self::apply_transition(&self.state, &self.callbacks, ConnectionState::Connecting).await;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        *self.cmd_tx.lock().await = Some(cmd_tx);

        let ctx = LifecycleContext {
            config: self.config.clone(),
            callbacks: self.callbacks.clone(),
            state: self.state.clone(),
            queue: self.queue.clone(),
            manual_close: self.manual_close.clone(),
        };
        let lifecycle_task = tokio::spawn(async move {
            Self::run_lifecycle(ctx, cmd_rx).await;
        });
        *self.lifecycle_task_handle.lock().await = Some(lifecycle_task);
        info!("[连接管理] 新的生命周期任务已启动。");
        Ok(())
    }

    /// 主动断开当前连接。
    ///
    /// 立即返回；生命周期任务收到请求后取消所有计时器（含未到期的重连
    /// 计时器与心跳对）、优雅关闭传输并迁移到 `Disconnected`。
    /// 在任何状态下调用都是安全的。
    ///
    /// # 参数
    /// * `reason` - 可选的关闭原因，会随关闭帧发送给服务端。
    pub async fn disconnect(&self, reason: Option<String>) {
        info!("[连接管理] disconnect 调用，原因: {:?}", reason);
        // 先置位手动关闭标志，确保随之而来的关闭不会被误判为故障
        self.manual_close.store(true, Ordering::SeqCst);

        let sender = self.cmd_tx.lock().await.clone();
        let delivered = match sender {
            Some(tx) => tx.send(Command::Disconnect { reason }).is_ok(),
            None => false,
        };
        if !delivered {
            // 没有活动的生命周期任务：直接完成状态迁移
            Self::apply_transition(&self.state, &self.callbacks, ConnectionState::Disconnected).await;
        }
    }

    /// 发送一帧文本。
    ///
    /// 连接可用时立即发出（`Sent`）；发送失败与连接不可用一视同仁——
    /// 消息排入发送队列（`Queued`），待下一次成功连接后按 FIFO 顺序冲刷；
    /// 队列已满时新消息被丢弃（`Dropped`）。本方法从不报错、从不阻塞调用方。
    pub async fn send_text(&self, text: String) -> SendOutcome {
        // 优先交给生命周期任务：由其按当前阶段决定立即发送还是排队
        let sender = self.cmd_tx.lock().await.clone();
        if let Some(tx) = sender {
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx
                .send(Command::Send { text: text.clone(), reply: reply_tx })
                .is_ok()
            {
                if let Ok(outcome) = reply_rx.await {
                    return outcome;
                }
                // 任务在处理命令前退出：回退到直接排队，消息不丢失
            }
        }
        // 没有活动任务（尚未 connect、已断开或已失败）：直接排队
        match self.queue.lock().await.push_back(text) {
            Enqueue::Queued => SendOutcome::Queued,
            Enqueue::DroppedNewest => {
                warn!("[连接管理] 发送队列已满 (容量 {})，新消息被丢弃。", self.config.outbound_queue_capacity);
                SendOutcome::Dropped
            }
        }
    }

    /// 把一个可序列化的载荷包装为携带 `type` 判别字段的帧并发送。
    ///
    /// 这是对 `send_text` 的便捷封装；唯一的错误路径是载荷无法序列化为
    /// JSON 对象（属于调用方输入错误），发送本身沿用 `send_text` 的语义。
    pub async fn send_frame<T>(&self, frame_type: &str, payload: &T) -> Result<SendOutcome, WsError>
    where
        T: Serialize,
    {
        let text = message::build_frame(frame_type, payload)?;
        debug!("[连接管理] 准备发送类型为 '{}' 的帧。", frame_type);
        Ok(self.send_text(text).await)
    }

    /// 检查当前是否处于 `Connected` 状态。
    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// 获取当前连接状态。
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// 执行一次状态迁移并通知应用层。
    /// 迁移到相同状态是空操作（幂等），不触发回调。
    async fn apply_transition(
        state: &RwLock<ConnectionState>,
        callbacks: &ClientCallbacks,
        new_state: ConnectionState,
    ) {
        let previous = {
            let mut guard = state.write().await;
            if *guard == new_state {
                return; // 相同状态迁移是空操作
            }
            let previous = *guard;
            *guard = new_state;
            previous
        };
        info!("[连接管理] 状态迁移: {} -> {}", previous, new_state);
        // 回调在释放锁之后调用，应用层在回调中读取状态不会死锁
        callbacks.emit_state_change(new_state);
    }

    /// 把一条消息排入共享发送队列并换算为发送结果。
    async fn enqueue_pending(ctx: &LifecycleContext, text: String) -> SendOutcome {
        match ctx.queue.lock().await.push_back(text) {
            Enqueue::Queued => SendOutcome::Queued,
            Enqueue::DroppedNewest => {
                warn!("[连接管理] (生命周期任务) 发送队列已满 (容量 {})，新消息被丢弃。", ctx.config.outbound_queue_capacity);
                SendOutcome::Dropped
            }
        }
    }

    /// 生命周期任务主体：连接、运行、失败后按策略重连，直至调用方断开、
    /// 重连次数耗尽或服务实例被丢弃。
    async fn run_lifecycle(ctx: LifecycleContext, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let mut reconnect = ReconnectController::from_config(&ctx.config);
        loop {
            // 此刻状态为 Connecting（由 connect() 或上一轮重连迁移而来）
            let url = match ctx.config.connect_url() {
                Ok(url) => url,
                Err(e) => {
                    // connect() 已做过同步校验，正常不会走到这里；保守按终止性错误处理
                    error!("[连接管理] (生命周期任务) 连接地址校验失败: {}", e);
                    Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Failed).await;
                    ctx.callbacks.emit_error(e);
                    return;
                }
            };
            let connection_id = Uuid::new_v4();

            match Self::open_transport_phase(&ctx, &mut cmd_rx, &url, connection_id).await {
                OpenOutcome::Aborted => {
                    info!("[连接管理] (生命周期任务) 打开传输期间收到断开请求，任务结束。");
                    Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Disconnected).await;
                    return;
                }
                OpenOutcome::Failed(e) => {
                    // 瞬时错误：仅记录日志，是否重连由下方统一决策
                    warn!("[连接管理] (生命周期任务) 连接尝试 {} 失败: {}", connection_id, e);
                }
                OpenOutcome::Opened(stream) => {
                    info!("[连接管理] (生命周期任务) 连接 {} 已成功建立。", connection_id);
                    // 成功进入 Connected：尝试计数归零
                    reconnect.reset();
                    Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Connected).await;

                    match Self::run_connected_phase(&ctx, &mut cmd_rx, *stream, connection_id).await {
                        ClosedBy::Manual => {
                            info!("[连接管理] (生命周期任务) 连接 {} 已按调用方要求关闭，任务结束。", connection_id);
                            Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Disconnected).await;
                            return;
                        }
                        ClosedBy::Transport(cause) => match cause {
                            Some(err) => warn!("[连接管理] (生命周期任务) 连接 {} 意外断开: {}", connection_id, err),
                            None => info!("[连接管理] (生命周期任务) 连接 {} 已由对方关闭。", connection_id),
                        },
                    }
                }
            }

            // --- 失败路径：决定是否重连 ---
            if ctx.manual_close.load(Ordering::SeqCst) {
                // 关闭实际上由调用方发起（标志先于关闭到达），不按故障处理
                info!("[连接管理] (生命周期任务) 检测到手动关闭标志，任务结束。");
                Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Disconnected).await;
                return;
            }
            if !ctx.config.reconnect_enabled {
                info!("[连接管理] (生命周期任务) 自动重连未启用，进入 Disconnected。");
                Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Disconnected).await;
                return;
            }

            Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Reconnecting).await;
            match reconnect.next_decision() {
                ReconnectDecision::GiveUp { attempts } => {
                    error!("[连接管理] (生命周期任务) 重连次数已耗尽 ({} 次)，进入 Failed。", attempts);
                    Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Failed).await;
                    ctx.callbacks.emit_error(WsError::ReconnectAttemptsExhausted { attempts });
                    return;
                }
                ReconnectDecision::RetryAfter(delay) => {
                    info!("[连接管理] (生命周期任务) 将在 {:?} 后进行下一次连接尝试。", delay);
                    if Self::wait_backoff_phase(&ctx, &mut cmd_rx, delay).await {
                        info!("[连接管理] (生命周期任务) 重连等待期间收到断开请求，计时器已取消，任务结束。");
                        Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Disconnected).await;
                        return;
                    }
                    Self::apply_transition(&ctx.state, &ctx.callbacks, ConnectionState::Connecting).await;
                }
            }
        }
    }

    /// 打开传输阶段：等待握手完成，同时持续响应调用方命令
    /// （发送请求排队，断开请求中止本次尝试）。
    async fn open_transport_phase(
        ctx: &LifecycleContext,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
        url: &Url,
        connection_id: Uuid,
    ) -> OpenOutcome {
        debug!("[连接管理] (生命周期任务) 连接尝试 {} 开始，目标: {}", connection_id, url);
        let connect_future = transport::open_transport(url);
        tokio::pin!(connect_future);
        loop {
            tokio::select! {
                result = &mut connect_future => {
                    return match result {
                        Ok(stream) => OpenOutcome::Opened(Box::new(stream)),
                        Err(e) => OpenOutcome::Failed(e),
                    };
                }
                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    Some(Command::Send { text, reply }) => {
                        // 连接尚未可用：排队等待冲刷
                        let outcome = Self::enqueue_pending(ctx, text).await;
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Disconnect { .. }) | None => return OpenOutcome::Aborted,
                }
            }
        }
    }

    /// 连接阶段：冲刷发送队列，随后在单一事件循环中多路复用
    /// 入站帧、心跳事件与调用方命令，直至连接因某种原因结束。
    async fn run_connected_phase(
        ctx: &LifecycleContext,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
        stream: ClientWsStream,
        connection_id: Uuid,
    ) -> ClosedBy {
        let (mut ws_sender, mut ws_receiver) = stream.split();

        // --- 冲刷发送队列（FIFO；单次失败即静默中止，剩余消息留待下次连接） ---
        {
            let mut queue = ctx.queue.lock().await;
            let pending = queue.len();
            if pending > 0 {
                info!("[连接管理] (生命周期任务) 开始冲刷发送队列，共 {} 条待发消息。", pending);
            }
            while let Some(text) = queue.pop_front() {
                if let Err(e) = ws_sender.send(TungsteniteMessage::Text(text.clone())).await {
                    warn!("[连接管理] (生命周期任务) 冲刷发送队列失败，剩余 {} 条消息保留: {}", queue.len() + 1, e);
                    queue.push_front(text); // 失败的消息原位放回，保持顺序
                    break;
                }
            }
        }

        // 心跳计时器对只在本作用域内存活：断开状态下不可能有心跳残留
        let mut heartbeat = HeartbeatSchedule::new(ctx.config.heartbeat_interval(), ctx.config.heartbeat_timeout());

        loop {
            tokio::select! {
                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    Some(Command::Send { text, reply }) => {
                        match ws_sender.send(TungsteniteMessage::Text(text.clone())).await {
                            Ok(()) => {
                                let _ = reply.send(SendOutcome::Sent);
                            }
                            Err(e) => {
                                // 发送失败与连接不可用一视同仁：消息排队，错误按传输故障处理
                                let outcome = Self::enqueue_pending(ctx, text).await;
                                let _ = reply.send(outcome);
                                error!("[连接管理] (生命周期任务) 连接 {} 发送消息失败: {}", connection_id, e);
                                return ClosedBy::Transport(Some(WsError::WebSocketProtocolError(e)));
                            }
                        }
                    }
                    Some(Command::Disconnect { reason }) => {
                        info!("[连接管理] (生命周期任务) 收到断开请求，正在优雅关闭连接 {}。", connection_id);
                        let close_frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: reason.unwrap_or_default().into(),
                        };
                        if let Err(e) = ws_sender.send(TungsteniteMessage::Close(Some(close_frame))).await {
                            debug!("[连接管理] (生命周期任务) 发送关闭帧失败 (连接可能已断开): {}", e);
                        }
                        return ClosedBy::Manual;
                    }
                    None => {
                        // 服务实例已被丢弃：按调用方关闭处理
                        info!("[连接管理] (生命周期任务) 命令通道已关闭，按调用方关闭处理。");
                        return ClosedBy::Manual;
                    }
                },

                event = heartbeat.next_event() => match event {
                    HeartbeatEvent::ProbeDue => {
                        match ProbeFrame::ping().to_json() {
                            Ok(json) => match ws_sender.send(TungsteniteMessage::Text(json)).await {
                                Ok(()) => heartbeat.note_probe_sent(),
                                Err(e) => {
                                    error!("[连接管理] (生命周期任务) 连接 {} 发送心跳探测失败: {}", connection_id, e);
                                    return ClosedBy::Transport(Some(WsError::WebSocketProtocolError(e)));
                                }
                            },
                            Err(e) => error!("[连接管理] (生命周期任务) 心跳探测帧序列化失败: {}", e),
                        }
                    }
                    HeartbeatEvent::ReplyTimedOut => {
                        warn!(
                            "[连接管理] (生命周期任务) 连接 {} 心跳回复超时 (超过 {:?} 未收到 pong)，强制断开。",
                            connection_id,
                            ctx.config.heartbeat_timeout()
                        );
                        let close_frame = CloseFrame {
                            code: CloseCode::Library(HEARTBEAT_TIMEOUT_CLOSE_CODE),
                            reason: "heartbeat timeout".into(),
                        };
                        if let Err(e) = ws_sender.send(TungsteniteMessage::Close(Some(close_frame))).await {
                            debug!("[连接管理] (生命周期任务) 发送心跳超时关闭帧失败: {}", e);
                        }
                        return ClosedBy::Transport(Some(WsError::HeartbeatTimeout(ctx.config.heartbeat_timeout())));
                    }
                },

                maybe_frame = ws_receiver.next() => match maybe_frame {
                    Some(Ok(TungsteniteMessage::Text(text))) => {
                        match message::classify(&text) {
                            Ok(InboundFrame::Ping) => {
                                // 服务端探测：立即应答，与我方的探测排程完全独立
                                debug!("[消息分发] 收到服务端 ping 探测，立即回复 pong。");
                                match ProbeFrame::pong().to_json() {
                                    Ok(json) => {
                                        if let Err(e) = ws_sender.send(TungsteniteMessage::Text(json)).await {
                                            error!("[消息分发] 回复 pong 失败: {}", e);
                                            return ClosedBy::Transport(Some(WsError::WebSocketProtocolError(e)));
                                        }
                                    }
                                    Err(e) => error!("[消息分发] pong 回复帧序列化失败: {}", e),
                                }
                            }
                            Ok(InboundFrame::Pong) => {
                                heartbeat.note_reply();
                            }
                            Ok(InboundFrame::Connected { ping_interval }) => {
                                info!("[消息分发] 收到握手确认帧，服务端建议心跳间隔: {:?}。", ping_interval);
                                if let Some(period) = ping_interval {
                                    heartbeat.adopt_interval(period);
                                }
                            }
                            Ok(InboundFrame::ServerError { message }) => {
                                // 服务端业务错误：上报应用层，不影响连接状态
                                warn!("[消息分发] 收到服务端错误帧: {}", message);
                                ctx.callbacks.emit_error(WsError::ServerReported(message));
                            }
                            Ok(InboundFrame::Application(value)) => {
                                ctx.callbacks.emit_message(value);
                            }
                            Err(e) => {
                                // 帧格式非法：记录并丢弃，不转发也不致命
                                warn!("[消息分发] 入站帧格式非法，已丢弃: {}", e);
                            }
                        }
                    }
                    Some(Ok(TungsteniteMessage::Binary(bin))) => {
                        // 协议不使用二进制帧：记录并丢弃
                        warn!("[消息分发] 收到非预期的二进制帧 (长度 {} 字节)，已丢弃。", bin.len());
                    }
                    Some(Ok(TungsteniteMessage::Ping(_))) => {
                        // WebSocket 协议层 Ping 由底层库自动回复 Pong，应用层无需处理
                        debug!("[消息分发] 收到传输层 Ping 控制帧 (由底层库自动应答)。");
                    }
                    Some(Ok(TungsteniteMessage::Pong(_))) => {
                        // 传输层 Pong 与本协议的 JSON pong 无关
                        debug!("[消息分发] 收到传输层 Pong 控制帧。");
                    }
                    Some(Ok(TungsteniteMessage::Close(close_frame))) => {
                        info!("[连接管理] (生命周期任务) 连接 {} 收到关闭帧: {:?}", connection_id, close_frame);
                        return ClosedBy::Transport(None);
                    }
                    Some(Ok(TungsteniteMessage::Frame(_))) => {
                        // 原始底层帧不应出现在应用层面
                        debug!("[消息分发] 收到非预期的底层原始帧，已跳过。");
                    }
                    Some(Err(e)) => {
                        return ClosedBy::Transport(Some(WsError::WebSocketProtocolError(e)));
                    }
                    None => {
                        info!("[连接管理] (生命周期任务) 连接 {} 的接收流已结束。", connection_id);
                        return ClosedBy::Transport(None);
                    }
                },
            }
        }
    }

    /// 重连等待阶段：可取消的一次性计时器。
    ///
    /// 等待期间仍响应调用方命令：发送请求排队；断开请求取消计时器并
    /// 返回 `true`，保证被取消的计时器不会再触发任何 `Connecting` 迁移。
    async fn wait_backoff_phase(
        ctx: &LifecycleContext,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
        delay: std::time::Duration,
    ) -> bool {
        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => return false,
                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    Some(Command::Send { text, reply }) => {
                        let outcome = Self::enqueue_pending(ctx, text).await;
                        let _ = reply.send(outcome);
                    }
                    Some(Command::Disconnect { .. }) | None => return true,
                }
            }
        }
    }
}
