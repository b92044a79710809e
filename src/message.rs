// src/message.rs

//! 定义 WebSocket 通信中使用的帧结构与入站帧分类逻辑。
//!
//! 线上的每一帧都是一个携带 `type` 判别字段的 JSON 对象。
//! 受识别的控制类型有四种：`ping`（活性探测）、`pong`（探测回复）、
//! `connected`（握手确认，可携带服务端建议的心跳间隔）、`error`（服务端上报的业务错误）。
//! 其余任何 `type` 值都视为应用数据，按接收顺序原样转发给应用层回调。
//! 无法解码的帧只记录日志并丢弃，既不转发也不视为致命错误。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::WsError;

/// 活性探测帧的 `type` 值。
pub const PING_FRAME_TYPE: &str = "ping";
/// 探测回复帧的 `type` 值。
pub const PONG_FRAME_TYPE: &str = "pong";
/// 握手确认帧的 `type` 值。
pub const CONNECTED_FRAME_TYPE: &str = "connected";
/// 服务端错误帧的 `type` 值。
pub const ERROR_FRAME_TYPE: &str = "error";

/// 探测/回复控制帧（`ping` 与 `pong` 共用同一结构，仅 `type` 值不同）。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeFrame {
    /// 帧类型判别字段，值为 `"ping"` 或 `"pong"`。
    #[serde(rename = "type")]
    pub frame_type: String,
    /// 帧构造时的 UTC 时间戳（自 Unix 纪元以来的毫秒数）。
    pub timestamp: i64,
}

impl ProbeFrame {
    /// 构造一个携带当前时间戳的 `ping` 探测帧。
    pub fn ping() -> Self {
        Self {
            frame_type: PING_FRAME_TYPE.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 构造一个携带当前时间戳的 `pong` 回复帧。
    pub fn pong() -> Self {
        Self {
            frame_type: PONG_FRAME_TYPE.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 序列化为发送用的 JSON 文本。
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self)
            .map_err(|e| WsError::SerializationError(format!("控制帧序列化为JSON失败: {}", e)))
    }
}

/// 握手确认帧中服务端建议的运行参数。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct HandshakeConfig {
    /// 服务端建议的心跳间隔，单位：秒。
    /// 存在时，后续心跳周期将采用该值替代构造时的默认间隔。
    pub ping_interval: Option<u64>,
}

/// 握手确认帧（`type = "connected"`）的载荷部分。
#[derive(Deserialize, Debug, Clone, Default)]
struct ConnectedFrame {
    /// 可选的服务端建议参数。
    #[serde(default)]
    config: Option<HandshakeConfig>,
}

/// 服务端错误帧（`type = "error"`）的载荷部分。
#[derive(Deserialize, Debug, Clone, Default)]
struct ServerErrorFrame {
    /// 服务端给出的错误描述。
    #[serde(default)]
    message: Option<String>,
}

/// 入站帧分类结果。
///
/// 控制帧在连接管理器内部消化；`Application` 变体原样转发给应用层回调。
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// 服务端发来的活性探测，需要立刻以 `pong` 回复。
    Ping,
    /// 对我方探测的回复，用于解除心跳超时倒计时。
    Pong,
    /// 握手确认；可携带服务端建议的心跳间隔（已换算为 `Duration`）。
    Connected {
        /// 服务端建议的心跳间隔；`None` 表示沿用配置值。
        ping_interval: Option<Duration>,
    },
    /// 服务端显式上报的业务错误，转发给错误回调，不影响连接状态。
    ServerError {
        /// 错误描述文本。
        message: String,
    },
    /// 应用数据帧，原样转发。
    Application(Value),
}

/// 对收到的一帧文本进行解码与分类。
///
/// 文本必须是一个 JSON 对象；解码失败或顶层不是对象时返回
/// `WsError::DeserializationError`（调用方记录日志后丢弃该帧）。
/// 对象缺少 `type` 字段、或 `type` 不属于四种控制类型时，整帧视为应用数据。
///
/// # 参数
/// * `text` - 从传输层收到的一帧原始文本。
///
/// # 返回
/// * `Result<InboundFrame, WsError>` - 分类结果，或帧格式非法时的解码错误。
pub fn classify(text: &str) -> Result<InboundFrame, WsError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| WsError::DeserializationError(format!("入站帧不是合法的JSON: {}, 原始文本: '{}'", e, text)))?;
    if !value.is_object() {
        return Err(WsError::DeserializationError(format!("入站帧顶层不是JSON对象, 原始文本: '{}'", text)));
    }

    // 取出独立所有权的判别值，后续分支才能整体移动 value
    let frame_type = value.get("type").and_then(Value::as_str).map(str::to_owned);
    match frame_type.as_deref() {
        Some(PING_FRAME_TYPE) => Ok(InboundFrame::Ping),
        Some(PONG_FRAME_TYPE) => Ok(InboundFrame::Pong),
        Some(CONNECTED_FRAME_TYPE) => {
            // config 字段缺失或结构不符时按"无建议参数"处理，握手本身仍然有效
            let frame: ConnectedFrame = serde_json::from_value(value.clone()).unwrap_or_default();
            let ping_interval = frame
                .config
                .and_then(|c| c.ping_interval)
                .map(Duration::from_secs);
            Ok(InboundFrame::Connected { ping_interval })
        }
        Some(ERROR_FRAME_TYPE) => {
            let frame: ServerErrorFrame = serde_json::from_value(value.clone()).unwrap_or_default();
            // 未给出 message 字段时退化为整帧文本，保证错误回调总有内容可报
            let message = frame.message.unwrap_or_else(|| text.to_string());
            Ok(InboundFrame::ServerError { message })
        }
        // 其余 type 值（含缺失 type 字段的对象）一律视为应用数据，原样转发
        _ => Ok(InboundFrame::Application(value)),
    }
}

/// 把一个可序列化的载荷包装为携带 `type` 判别字段的应用数据帧。
///
/// 载荷必须序列化为 JSON 对象（判别字段要与载荷字段平铺在同一层）；
/// `type` 字段由本函数写入，载荷中同名字段会被覆盖。
///
/// # 参数
/// * `frame_type` - 帧的 `type` 判别值。
/// * `payload` - 实现了 `serde::Serialize` 的载荷数据。
///
/// # 返回
/// * `Result<String, WsError>` - 拼装完成的 JSON 文本；载荷无法序列化为
///   JSON 对象时返回 `WsError::SerializationError`。
pub fn build_frame<T: Serialize>(frame_type: &str, payload: &T) -> Result<String, WsError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| WsError::SerializationError(format!("帧载荷序列化失败: {}", e)))?;
    let mut object = match value {
        Value::Object(map) => map,
        other => {
            return Err(WsError::SerializationError(format!(
                "帧载荷必须序列化为JSON对象, 实际为: {}",
                other
            )));
        }
    };
    object.insert("type".to_string(), Value::String(frame_type.to_string()));
    serde_json::to_string(&Value::Object(object))
        .map_err(|e| WsError::SerializationError(format!("帧序列化为JSON失败: {}", e)))
}
