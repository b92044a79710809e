// src/queue.rs

//! 发送队列模块。
//!
//! 本模块定义了 `OutboundQueue`——在连接不可用期间暂存待发消息的
//! 容量受限 FIFO 缓冲区。插入顺序即发送顺序；队列满时丢弃**新**消息
//! 而不是挤掉最旧的消息（背压策略：保护已经排队的关键消息）。
//! 连接恢复后由连接管理器按 FIFO 顺序冲刷。

use std::collections::VecDeque;

/// 入队操作的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// 消息已排入队列，将在下一次连接可用时发送。
    Queued,
    /// 队列已满，新消息被丢弃（已排队的消息保持不变）。
    DroppedNewest,
}

/// 容量受限的待发消息 FIFO 缓冲区。
#[derive(Debug)]
pub struct OutboundQueue {
    /// 按插入顺序保存的待发消息。
    items: VecDeque<String>,
    /// 队列容量（条数）。
    capacity: usize,
}

impl OutboundQueue {
    /// 创建一个指定容量的空队列。
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// 尝试把一条消息排到队尾。
    ///
    /// 队列已满时返回 `Enqueue::DroppedNewest` 且队列内容不变——
    /// 丢弃的是新消息，不是队首的旧消息。
    pub fn push_back(&mut self, message: String) -> Enqueue {
        if self.items.len() >= self.capacity {
            return Enqueue::DroppedNewest;
        }
        self.items.push_back(message);
        Enqueue::Queued
    }

    /// 把一条消息放回队首。
    ///
    /// 用于冲刷中断的场景：消息此前已被接受入队，发送失败后原位放回，
    /// 因此不做容量检查（队列可能短暂超出容量一条）。
    pub fn push_front(&mut self, message: String) {
        self.items.push_front(message);
    }

    /// 取出队首消息；队列为空时返回 `None`。
    pub fn pop_front(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    /// 当前排队的消息条数。
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 队列是否为空。
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
