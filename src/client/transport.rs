// src/client/transport.rs

//! 客户端 WebSocket 传输层。
//!
//! 本模块封装底层 `tokio-tungstenite` 库的连接建立细节，向连接管理器提供
//! 一个最小的接口：按给定地址完成一次握手，返回可读写的流。
//! 流的拆分、收发循环与生命周期管理都属于 `manager` 模块的职责——
//! 传输句柄在任一时刻只存在一个，由连接阶段的局部作用域独占持有，
//! 每次重连尝试都会创建新的句柄替换旧的（从不复用）。

use log::{debug, error, info};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::WsError;

/// `ClientWsStream` 类型别名，代表一个可能经过 TLS 加密的 TCP WebSocket 流。
/// 这是 `tokio-tungstenite` 库在客户端连接成功后返回的典型流类型。
pub type ClientWsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// 异步连接到指定的 WebSocket 服务器并完成握手。
///
/// 地址应当已经通过 `ClientConfig::connect_url` 完成校验与凭证拼装。
///
/// # 参数
/// * `url` - 拼装完成的 WebSocket 连接地址。
///
/// # 返回
/// * `Result<ClientWsStream, WsError>` - 握手成功时返回完整的流；
///   连接或握手失败时返回包装后的协议错误（瞬时错误，由重连策略处理）。
pub(crate) async fn open_transport(url: &Url) -> Result<ClientWsStream, WsError> {
    info!("[传输层] 开始尝试连接到 WebSocket 服务器，URL: {}", url);
    match connect_async(url.as_str()).await {
        Ok((ws_stream, response)) => {
            // 连接成功
            info!("[传输层] 已成功连接到 {} (HTTP 状态码: {})", url, response.status());
            debug!("[传输层] WebSocket 连接响应头: {:?}", response.headers());
            Ok(ws_stream)
        }
        Err(e) => {
            // 连接失败
            error!("[传输层] 连接到 {} 失败，错误: {}", url, e);
            Err(WsError::WebSocketProtocolError(e))
        }
    }
}
