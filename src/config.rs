// src/config.rs

//! 客户端连接配置模块。
//!
//! 本模块定义了 `ClientConfig`——建立一条逻辑连接所需的全部输入参数
//! （目标地址、可选凭证、心跳与重连调优参数、发送队列容量）。
//! 配置在构造时一次性给定，之后不再修改；连接管理器内部以 `Arc` 共享只读引用。
//! 所有字段均派生 serde，便于调用方像加载其他应用配置一样从 JSON 文件反序列化。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::WsError;

/// 默认心跳发送间隔，单位：毫秒。
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// 默认等待 pong 回复的超时时间，单位：毫秒。
/// 注意：此值应小于心跳间隔，以确保在下一个心跳周期开始前能检测到超时。
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
/// 默认首次重连延迟，单位：毫秒。
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
/// 默认重连延迟上限，单位：毫秒。
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
/// 默认重连退避倍率。
pub const DEFAULT_RECONNECT_MULTIPLIER: f64 = 1.5;
/// 默认最大重连尝试次数。
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
/// 默认发送队列容量（条数）。
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 100;

/// WebSocket 客户端连接配置（连接描述符）。
///
/// 本结构体存储了与服务端建立并维持一条逻辑 WebSocket 连接所必需的全部参数。
/// 构造后不可变：连接管理器从不修改配置，重连时也总是使用同一份参数。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    /// 服务端 WebSocket 地址。
    ///
    /// **示例**: `"ws://127.0.0.1:8088/stream"`（本地开发测试）
    /// 或 `"wss://your.server.com/api/stream"`（生产环境）。
    pub url: String,

    /// 可选的鉴权凭证。
    /// 存在时会在连接阶段以 `token` 查询参数的形式追加到目标地址上。
    pub auth_token: Option<String>,

    /// 心跳发送间隔，单位：毫秒。
    /// 服务端可在握手确认帧中给出建议值，后续周期将采用该建议值。
    pub heartbeat_interval_ms: u64,

    /// 发送心跳探测后等待 pong 回复的超时时间，单位：毫秒。
    pub heartbeat_timeout_ms: u64,

    /// 是否在连接意外断开后自动重连。
    pub reconnect_enabled: bool,

    /// 首次重连的基础延迟，单位：毫秒。
    pub reconnect_base_delay_ms: u64,

    /// 重连延迟的上限，单位：毫秒。
    pub reconnect_max_delay_ms: u64,

    /// 重连延迟的指数退避倍率。
    pub reconnect_multiplier: f64,

    /// 最大重连尝试次数。达到上限后状态机进入 `Failed`，不再重试。
    pub max_reconnect_attempts: u32,

    /// 发送队列容量（条数）。队列满时新消息被丢弃（保护已排队的消息）。
    pub outbound_queue_capacity: usize,
}

// 为 ClientConfig 实现 Default trait
impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),                                          // 地址由调用方显式给定
            auth_token: None,                                            // 默认不携带凭证
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,        // 默认每 30 秒发送一次心跳
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,          // 默认 10 秒未收到 pong 则判定超时
            reconnect_enabled: true,                                     // 默认开启自动重连
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,    // 首次重连等待 1 秒
            reconnect_max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,      // 重连延迟最长 30 秒
            reconnect_multiplier: DEFAULT_RECONNECT_MULTIPLIER,          // 每次失败延迟乘以 1.5
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,      // 最多连续尝试 10 次
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,    // 最多缓存 100 条待发消息
        }
    }
}

impl ClientConfig {
    /// 以给定地址创建一份使用默认调优参数的配置。
    ///
    /// # 参数
    /// * `url` - 服务端 WebSocket 地址字符串。
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// 构造实际用于连接的完整地址。
    ///
    /// 校验 `url` 字段的格式；若配置了 `auth_token`，将其以 `token` 查询参数
    /// 的形式追加到地址上。每次连接尝试（含重连）都重新调用本方法，
    /// 因此凭证总是出现在每一次握手请求中。
    ///
    /// # 返回
    /// * `Result<Url, WsError>` - 地址合法时返回拼装完成的 `Url`；
    ///   格式非法时返回 `WsError::InvalidUrl`（终止性错误，见 `error` 模块）。
    pub fn connect_url(&self) -> Result<Url, WsError> {
        let mut parsed = Url::parse(&self.url)
            .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", self.url, e)))?;
        // ws/wss 之外的 scheme 在握手阶段必然失败，提前在此拦截
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(WsError::InvalidUrl(format!(
                    "不支持的 URL scheme '{}'（应为 ws 或 wss）: {}",
                    other, self.url
                )));
            }
        }
        if let Some(token) = &self.auth_token {
            parsed.query_pairs_mut().append_pair("token", token);
        }
        Ok(parsed)
    }

    /// 心跳发送间隔（`Duration` 形式）。
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// pong 回复超时（`Duration` 形式）。
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// 首次重连基础延迟（`Duration` 形式）。
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// 重连延迟上限（`Duration` 形式）。
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}
