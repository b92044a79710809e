// tests/client_lifecycle_integration_test.rs

//! 连接生命周期集成测试。
//!
//! 每个测试都会在 127.0.0.1 的随机端口上启动一个一次性的本地 WebSocket
//! 服务器（或故意使用无人监听的端口），然后驱动 `WsClientService` 走完
//! 相应的生命周期场景：连接与握手、排队冲刷、心跳应答与超时、
//! 服务端错误帧、断线重连、重连期间手动断开、重连次数耗尽等。

use futures_util::{SinkExt, StreamExt};
use log::{LevelFilter, info};
use resilient_ws_client::{
    ClientCallbacks, ClientConfig, ConnectionState, HEARTBEAT_TIMEOUT_CLOSE_CODE, SendOutcome,
    WsClientService, WsError,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

/// 辅助函数：初始化日志，仅用于测试，避免多次初始化。
fn init_test_logger() {
    // is_test(true) 确保日志输出到 stdout 并且不会互相干扰（如果并行测试）
    let _ = env_logger::builder().filter_level(LevelFilter::Info).is_test(true).try_init();
}

/// 辅助函数：绑定一个随机端口的监听器，返回监听器与对应的 ws:// 地址。
async fn bind_test_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
    let addr = listener.local_addr().expect("无法获取本地监听地址");
    (listener, format!("ws://{}", addr))
}

/// 辅助函数：接受一个连接并完成 WebSocket 握手。
async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp_stream, peer_addr) = listener.accept().await.expect("接受 TCP 连接失败");
    info!("[测试服务端] 从 {} 接受了新的 TCP 连接", peer_addr);
    accept_async(tcp_stream).await.expect("WebSocket 握手失败")
}

/// 辅助函数：构造把三类通知分别录制到通道中的回调集合。
fn recording_callbacks() -> (
    ClientCallbacks,
    mpsc::UnboundedReceiver<ConnectionState>,
    mpsc::UnboundedReceiver<Value>,
    mpsc::UnboundedReceiver<String>,
) {
    let (state_tx, state_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    let callbacks = ClientCallbacks {
        on_state_change: Some(Arc::new(move |state| {
            let _ = state_tx.send(state);
        })),
        on_message: Some(Arc::new(move |frame| {
            let _ = message_tx.send(frame);
        })),
        on_error: Some(Arc::new(move |err| {
            let _ = error_tx.send(err.to_string());
        })),
    };
    (callbacks, state_rx, message_rx, error_rx)
}

/// 辅助函数：在限定时间内等待下一个状态通知并断言其值。
async fn expect_state(state_rx: &mut mpsc::UnboundedReceiver<ConnectionState>, expected: ConnectionState) {
    let state = timeout(Duration::from_secs(5), state_rx.recv())
        .await
        .unwrap_or_else(|_| panic!("等待状态 {} 超时", expected))
        .expect("状态通道意外关闭");
    assert_eq!(state, expected, "状态迁移顺序与预期不符");
}

/// 辅助函数：构造用于测试的客户端配置（心跳间隔足够长，不干扰场景本身）。
fn test_config(url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(url);
    config.heartbeat_interval_ms = 60_000;
    config.heartbeat_timeout_ms = 10_000;
    config.reconnect_base_delay_ms = 50;
    config.reconnect_max_delay_ms = 500;
    config.reconnect_multiplier = 1.5;
    config.max_reconnect_attempts = 5;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试完整的连接建立流程：握手确认帧被内部消化、应用数据帧按序转发、
/// 手动断开后进入 `Disconnected`。
async fn test_connect_dispatch_and_disconnect() {
    init_test_logger();
    let (listener, url) = bind_test_listener().await;

    let server_task = tokio::spawn(async move {
        let mut ws_stream = accept_ws(&listener).await;
        // 先发握手确认，再发两帧应用数据
        ws_stream
            .send(TungsteniteMessage::Text(r#"{"type":"connected","config":{"ping_interval":20}}"#.to_string()))
            .await
            .expect("发送握手确认帧失败");
        ws_stream
            .send(TungsteniteMessage::Text(r#"{"type":"log_line","content":"服务已启动"}"#.to_string()))
            .await
            .expect("发送应用数据帧失败");
        ws_stream
            .send(TungsteniteMessage::Text(r#"{"type":"metric","value":42}"#.to_string()))
            .await
            .expect("发送应用数据帧失败");
        // 保持连接直到客户端关闭
        while let Some(Ok(msg)) = ws_stream.next().await {
            if let TungsteniteMessage::Close(_) = msg {
                break;
            }
        }
    });

    let (callbacks, mut state_rx, mut message_rx, _error_rx) = recording_callbacks();
    let service = WsClientService::new(test_config(&url), callbacks);

    service.connect().await.expect("connect 启动失败");
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Connected).await;
    assert!(service.is_connected().await, "状态迁移到 Connected 后 is_connected 应为 true");

    // 握手确认帧被内部消化，应用层只看到两帧应用数据，且保持接收顺序
    let first = timeout(Duration::from_secs(5), message_rx.recv()).await.expect("等待应用数据帧超时").expect("消息通道意外关闭");
    assert_eq!(first["type"], "log_line", "第一帧应用数据应为 log_line");
    assert_eq!(first["content"], "服务已启动", "应用数据帧内容不应被改写");
    let second = timeout(Duration::from_secs(5), message_rx.recv()).await.expect("等待应用数据帧超时").expect("消息通道意外关闭");
    assert_eq!(second["type"], "metric", "第二帧应用数据应为 metric，分发顺序必须与接收顺序一致");

    service.disconnect(Some("测试结束".to_string())).await;
    expect_state(&mut state_rx, ConnectionState::Disconnected).await;
    assert!(!service.is_connected().await, "断开后 is_connected 应为 false");

    let _ = timeout(Duration::from_secs(5), server_task).await.expect("测试服务端未在预期时间内退出");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试连接建立期间的排队：`Connecting` 阶段发送的消息进入队列，
/// 连接成功后先于后续消息按 FIFO 顺序冲刷。
async fn test_send_while_connecting_is_queued_and_flushed_in_order() {
    init_test_logger();
    let (listener, url) = bind_test_listener().await;
    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<String>();

    let server_task = tokio::spawn(async move {
        // 故意延迟接受连接，让客户端在 Connecting 阶段停留一段时间
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut ws_stream = accept_ws(&listener).await;
        while let Some(Ok(msg)) = ws_stream.next().await {
            match msg {
                TungsteniteMessage::Text(text) => {
                    let _ = received_tx.send(text);
                }
                TungsteniteMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    let (callbacks, mut state_rx, _message_rx, _error_rx) = recording_callbacks();
    let service = WsClientService::new(test_config(&url), callbacks);

    service.connect().await.expect("connect 启动失败");
    expect_state(&mut state_rx, ConnectionState::Connecting).await;

    // Connecting 阶段：两条消息都应进入队列
    assert_eq!(service.send_text("hello".to_string()).await, SendOutcome::Queued, "Connecting 阶段发送应返回 Queued");
    assert_eq!(service.send_text("第二条".to_string()).await, SendOutcome::Queued, "Connecting 阶段发送应返回 Queued");

    expect_state(&mut state_rx, ConnectionState::Connected).await;
    // Connected 之后的消息应立即发出，且排在冲刷内容之后
    assert_eq!(service.send_text("world".to_string()).await, SendOutcome::Sent, "Connected 阶段发送应返回 Sent");

    let mut received = Vec::new();
    for _ in 0..3 {
        let text = timeout(Duration::from_secs(5), received_rx.recv()).await.expect("等待服务端接收消息超时").expect("接收通道意外关闭");
        received.push(text);
    }
    assert_eq!(
        received,
        vec!["hello".to_string(), "第二条".to_string(), "world".to_string()],
        "排队消息应先于后续消息、并按入队顺序到达服务端"
    );

    service.disconnect(None).await;
    expect_state(&mut state_rx, ConnectionState::Disconnected).await;
    let _ = timeout(Duration::from_secs(5), server_task).await.expect("测试服务端未在预期时间内退出");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试服务端探测的应答：收到 `{"type":"ping"}` 后客户端立即回复
/// 带时间戳的 pong，且不影响连接状态。
async fn test_server_ping_gets_immediate_pong() {
    init_test_logger();
    let (listener, url) = bind_test_listener().await;
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<String>();

    let server_task = tokio::spawn(async move {
        let mut ws_stream = accept_ws(&listener).await;
        ws_stream
            .send(TungsteniteMessage::Text(r#"{"type":"ping"}"#.to_string()))
            .await
            .expect("发送 ping 探测失败");
        while let Some(Ok(msg)) = ws_stream.next().await {
            match msg {
                TungsteniteMessage::Text(text) => {
                    let _ = pong_tx.send(text);
                }
                TungsteniteMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    let (callbacks, mut state_rx, _message_rx, _error_rx) = recording_callbacks();
    let service = WsClientService::new(test_config(&url), callbacks);

    service.connect().await.expect("connect 启动失败");
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Connected).await;

    let reply = timeout(Duration::from_secs(5), pong_rx.recv()).await.expect("等待 pong 回复超时").expect("pong 通道意外关闭");
    let value: Value = serde_json::from_str(&reply).expect("pong 回复不是合法JSON");
    assert_eq!(value["type"], "pong", "对服务端探测的回复应为 pong 帧");
    assert!(value["timestamp"].is_i64(), "pong 回复应携带毫秒时间戳");
    assert!(service.is_connected().await, "应答服务端探测不应影响连接状态");

    service.disconnect(None).await;
    expect_state(&mut state_rx, ConnectionState::Disconnected).await;
    let _ = timeout(Duration::from_secs(5), server_task).await.expect("测试服务端未在预期时间内退出");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试服务端错误帧：经 `on_error` 上报，连接状态保持 `Connected`。
async fn test_server_error_frame_is_surfaced_without_state_change() {
    init_test_logger();
    let (listener, url) = bind_test_listener().await;

    let server_task = tokio::spawn(async move {
        let mut ws_stream = accept_ws(&listener).await;
        ws_stream
            .send(TungsteniteMessage::Text(r#"{"type":"error","message":"订阅的频道不存在"}"#.to_string()))
            .await
            .expect("发送错误帧失败");
        while let Some(Ok(msg)) = ws_stream.next().await {
            if let TungsteniteMessage::Close(_) = msg {
                break;
            }
        }
    });

    let (callbacks, mut state_rx, _message_rx, mut error_rx) = recording_callbacks();
    let service = WsClientService::new(test_config(&url), callbacks);

    service.connect().await.expect("connect 启动失败");
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Connected).await;

    let reported = timeout(Duration::from_secs(5), error_rx.recv()).await.expect("等待错误回调超时").expect("错误通道意外关闭");
    assert!(reported.contains("订阅的频道不存在"), "错误回调应携带服务端给出的描述: {}", reported);

    // 错误帧不是传输故障：稍作等待后连接仍应保持
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.is_connected().await, "服务端错误帧不应改变连接状态");

    service.disconnect(None).await;
    expect_state(&mut state_rx, ConnectionState::Disconnected).await;
    let _ = timeout(Duration::from_secs(5), server_task).await.expect("测试服务端未在预期时间内退出");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试断线重连：服务端断开第一条连接后，客户端经 `Reconnecting`
/// 自动重建连接并回到 `Connected`。
async fn test_reconnects_after_server_drops_connection() {
    init_test_logger();
    let (listener, url) = bind_test_listener().await;

    let server_task = tokio::spawn(async move {
        // 第一条连接：握手完成后立即断开
        let ws_stream = accept_ws(&listener).await;
        drop(ws_stream);
        info!("[测试服务端] 已故意断开第一条连接");
        // 第二条连接：保持到客户端关闭
        let mut ws_stream = accept_ws(&listener).await;
        while let Some(Ok(msg)) = ws_stream.next().await {
            if let TungsteniteMessage::Close(_) = msg {
                break;
            }
        }
    });

    let (callbacks, mut state_rx, _message_rx, _error_rx) = recording_callbacks();
    let service = WsClientService::new(test_config(&url), callbacks);

    service.connect().await.expect("connect 启动失败");
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Connected).await;
    // 服务端断开后应进入重连流程
    expect_state(&mut state_rx, ConnectionState::Reconnecting).await;
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Connected).await;
    assert!(service.is_connected().await, "重连成功后 is_connected 应为 true");

    service.disconnect(None).await;
    expect_state(&mut state_rx, ConnectionState::Disconnected).await;
    let _ = timeout(Duration::from_secs(5), server_task).await.expect("测试服务端未在预期时间内退出");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试心跳超时：服务端不回应 pong 时，客户端以关闭码 4000 强制断开
/// 并进入重连流程。
async fn test_heartbeat_timeout_forces_close_and_reconnect() {
    init_test_logger();
    let (listener, url) = bind_test_listener().await;
    let (close_code_tx, mut close_code_rx) = mpsc::unbounded_channel::<u16>();

    let server_task = tokio::spawn(async move {
        // 第一条连接：读取但从不回应 pong，等待客户端因心跳超时而关闭
        let mut ws_stream = accept_ws(&listener).await;
        while let Some(Ok(msg)) = ws_stream.next().await {
            if let TungsteniteMessage::Close(close_frame) = msg {
                if let Some(frame) = close_frame {
                    let _ = close_code_tx.send(frame.code.into());
                }
                break;
            }
        }
        // 第二条连接：接受重连并保持
        let mut ws_stream = accept_ws(&listener).await;
        while let Some(Ok(msg)) = ws_stream.next().await {
            if let TungsteniteMessage::Close(_) = msg {
                break;
            }
        }
    });

    let mut config = test_config(&url);
    config.heartbeat_interval_ms = 100; // 快速心跳，便于测试
    config.heartbeat_timeout_ms = 80;
    let (callbacks, mut state_rx, _message_rx, _error_rx) = recording_callbacks();
    let service = WsClientService::new(config, callbacks);

    service.connect().await.expect("connect 启动失败");
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Connected).await;

    // 服务端收到的关闭帧应携带心跳超时专用的关闭码
    let code = timeout(Duration::from_secs(5), close_code_rx.recv()).await.expect("等待关闭帧超时").expect("关闭码通道意外关闭");
    assert_eq!(code, HEARTBEAT_TIMEOUT_CLOSE_CODE, "心跳超时应使用专用关闭码 4000");

    // 心跳超时属于非调用方关闭：应触发重连并恢复
    expect_state(&mut state_rx, ConnectionState::Reconnecting).await;
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Connected).await;

    service.disconnect(None).await;
    expect_state(&mut state_rx, ConnectionState::Disconnected).await;
    let _ = timeout(Duration::from_secs(5), server_task).await.expect("测试服务端未在预期时间内退出");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试重连等待期间的手动断开：计时器被取消，之后不再出现任何
/// `Connecting` 迁移。
async fn test_disconnect_during_reconnecting_cancels_pending_timer() {
    init_test_logger();
    // 绑定随机端口后立刻释放，得到一个大概率无人监听的地址
    let (listener, url) = bind_test_listener().await;
    drop(listener);

    let mut config = test_config(&url);
    config.reconnect_base_delay_ms = 300; // 足够长的等待窗口，便于在其中断开
    config.max_reconnect_attempts = 5;
    let (callbacks, mut state_rx, _message_rx, _error_rx) = recording_callbacks();
    let service = WsClientService::new(config, callbacks);

    service.connect().await.expect("connect 启动失败");
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    // 连接被拒绝后进入重连等待
    expect_state(&mut state_rx, ConnectionState::Reconnecting).await;

    // 在 300ms 计时器到期之前手动断开
    service.disconnect(Some("放弃重连".to_string())).await;
    expect_state(&mut state_rx, ConnectionState::Disconnected).await;

    // 等待超过原定延迟，确认被取消的计时器没有再触发任何状态迁移
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(
        state_rx.try_recv().is_err(),
        "断开后被取消的重连计时器不应再产生 Connecting 迁移"
    );
    assert_eq!(service.state().await, ConnectionState::Disconnected, "最终状态应停留在 Disconnected");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试重连次数耗尽：全部尝试失败后进入 `Failed`，错误经 `on_error`
/// 上报恰好一次。
async fn test_exhausted_attempts_transition_to_failed() {
    init_test_logger();
    let (listener, url) = bind_test_listener().await;
    drop(listener); // 无人监听：所有连接尝试都会被拒绝

    let mut config = test_config(&url);
    config.reconnect_base_delay_ms = 10;
    config.reconnect_multiplier = 1.0;
    config.max_reconnect_attempts = 2;
    let (callbacks, mut state_rx, _message_rx, mut error_rx) = recording_callbacks();
    let service = WsClientService::new(config, callbacks);

    service.connect().await.expect("connect 启动失败");

    // 初次尝试 + 2 次重试全部失败后进入 Failed
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Reconnecting).await;
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Reconnecting).await;
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Reconnecting).await;
    expect_state(&mut state_rx, ConnectionState::Failed).await;

    let reported = timeout(Duration::from_secs(5), error_rx.recv()).await.expect("等待错误回调超时").expect("错误通道意外关闭");
    assert!(reported.contains("重连失败"), "错误回调应说明重连次数耗尽: {}", reported);
    assert!(error_rx.try_recv().is_err(), "终止性错误应只上报一次");
    assert_eq!(service.state().await, ConnectionState::Failed, "最终状态应为 Failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试非法连接地址：`connect()` 同步返回错误，状态机进入 `Failed`。
async fn test_invalid_url_is_terminal() {
    init_test_logger();
    let (callbacks, mut state_rx, _message_rx, mut error_rx) = recording_callbacks();
    let service = WsClientService::new(test_config("这不是一个URL"), callbacks);

    match service.connect().await {
        Err(WsError::InvalidUrl(_)) => {} // 预期的错误类型
        other => panic!("非法地址的 connect 应返回 InvalidUrl，实际为: {:?}", other),
    }
    expect_state(&mut state_rx, ConnectionState::Connecting).await;
    expect_state(&mut state_rx, ConnectionState::Failed).await;

    let reported = timeout(Duration::from_secs(5), error_rx.recv()).await.expect("等待错误回调超时").expect("错误通道意外关闭");
    assert!(reported.contains("无效的URL"), "错误回调应说明地址非法: {}", reported);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 测试未连接状态下的发送语义：从不报错，队列有空间时排队，
/// 容量耗尽后丢弃新消息。
async fn test_send_while_disconnected_queues_then_drops() {
    init_test_logger();
    let mut config = test_config("ws://127.0.0.1:9");
    config.outbound_queue_capacity = 2;
    let (callbacks, _state_rx, _message_rx, _error_rx) = recording_callbacks();
    let service = WsClientService::new(config, callbacks);

    // 尚未 connect：消息直接进入队列
    assert_eq!(service.send_text("一".to_string()).await, SendOutcome::Queued, "有空间时应排队");
    assert_eq!(service.send_text("二".to_string()).await, SendOutcome::Queued, "有空间时应排队");
    assert_eq!(service.send_text("三".to_string()).await, SendOutcome::Dropped, "容量耗尽后应丢弃新消息");
    assert_eq!(service.state().await, ConnectionState::Disconnected, "发送操作不应改变连接状态");
}
