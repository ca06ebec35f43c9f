//! 内存 broker
//!
//! 在单进程内模拟 nsqd 的 topic/channel 语义，同时实现发布端和订阅端：
//! 没有 channel 的 topic 会暂存消息，第一个 channel 出现时全部转入；
//! 每个 channel 独立维护就绪队列、延迟队列和在途消息。
//! 在途消息超过 `msg_timeout` 仍未 finish 时重新入队，与 nsqd 的 `--msg-timeout` 一致

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use iron_common::new_message_id;
use iron_errors::QueueResult;
use iron_ports::{
    Disposition, InboundHandler, InboundMessage, OutboundPayload, Publisher, RawPublishResult,
    RunOutcome, SubscribeRequest, Subscriber,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// nsqd 默认的 `--msg-timeout`
pub const DEFAULT_MSG_TIMEOUT: Duration = Duration::from_secs(60);

struct Deferred {
    ready_at: Instant,
    message: InboundMessage,
}

struct InFlight {
    expires_at: Instant,
    message: InboundMessage,
}

#[derive(Default)]
struct ChannelState {
    ready: VecDeque<InboundMessage>,
    deferred: Vec<Deferred>,
    in_flight: HashMap<String, InFlight>,
    message_count: u64,
    requeue_count: u64,
    finish_count: u64,
    timeout_count: u64,
}

impl ChannelState {
    fn push(&mut self, message: InboundMessage) {
        self.message_count += 1;
        self.ready.push_back(message);
    }

    /// 超时的在途消息和到期的延迟消息转入就绪队列
    fn promote(&mut self, now: Instant) {
        if self.in_flight.values().any(|f| f.expires_at <= now) {
            let (mut expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
                .into_values()
                .partition(|f| f.expires_at <= now);
            self.in_flight = live
                .into_iter()
                .map(|f| (f.message.id.clone(), f))
                .collect();
            expired.sort_by_key(|f| f.expires_at);
            for InFlight { mut message, .. } in expired {
                message.attempts = message.attempts.saturating_add(1);
                self.timeout_count += 1;
                self.ready.push_back(message);
            }
        }

        if self.deferred.is_empty() {
            return;
        }
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|d| d.ready_at <= now);
        self.deferred = pending;
        due.sort_by_key(|d| d.ready_at);
        self.ready.extend(due.into_iter().map(|d| d.message));
    }

    fn next_wake(&self) -> Option<Instant> {
        self.deferred
            .iter()
            .map(|d| d.ready_at)
            .chain(self.in_flight.values().map(|f| f.expires_at))
            .min()
    }

    fn to_json(&self, name: &str) -> Value {
        json!({
            "channel_name": name,
            "depth": self.ready.len() + self.deferred.len(),
            "in_flight_count": self.in_flight.len(),
            "deferred_count": self.deferred.len(),
            "message_count": self.message_count,
            "requeue_count": self.requeue_count,
            "finish_count": self.finish_count,
            "timeout_count": self.timeout_count,
        })
    }
}

#[derive(Default)]
struct TopicState {
    backlog: VecDeque<InboundMessage>,
    channels: BTreeMap<String, ChannelState>,
    message_count: u64,
}

impl TopicState {
    fn to_json(&self, name: &str) -> Value {
        json!({
            "topic_name": name,
            "depth": self.backlog.len(),
            "message_count": self.message_count,
            "channels": self
                .channels
                .iter()
                .map(|(channel, state)| state.to_json(channel))
                .collect::<Vec<_>>(),
        })
    }
}

/// 内存 broker
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, TopicState>>,
    notify: Notify,
    msg_timeout: Duration,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            msg_timeout: DEFAULT_MSG_TIMEOUT,
        }
    }

    /// 在途消息未 finish 时重新入队的超时
    pub fn with_msg_timeout(mut self, msg_timeout: Duration) -> Self {
        self.msg_timeout = msg_timeout;
        self
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 写入消息
    pub fn enqueue(&self, topic: &str, messages: Vec<InboundMessage>) {
        {
            let mut topics = self.topics.lock();
            let state = topics.entry(topic.to_string()).or_default();
            state.message_count += messages.len() as u64;
            if state.channels.is_empty() {
                state.backlog.extend(messages);
            } else {
                for channel in state.channels.values_mut() {
                    for message in &messages {
                        channel.push(message.clone());
                    }
                }
            }
        }
        self.notify.notify_waiters();
    }

    /// 创建 channel，第一个 channel 接收 topic 暂存的消息
    pub fn ensure_channel(&self, topic: &str, channel: &str) {
        let mut topics = self.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();
        if state.channels.contains_key(channel) {
            return;
        }
        let mut channel_state = ChannelState::default();
        for message in state.backlog.drain(..) {
            channel_state.push(message);
        }
        state.channels.insert(channel.to_string(), channel_state);
        debug!(topic = topic, channel = channel, "Channel created");
    }

    /// channel 中待投递（就绪 + 延迟）的消息数
    pub fn depth(&self, topic: &str, channel: &str) -> usize {
        self.with_channel(topic, channel, |c| c.ready.len() + c.deferred.len())
            .unwrap_or(0)
    }

    /// channel 中在途的消息数
    pub fn in_flight(&self, topic: &str, channel: &str) -> usize {
        self.with_channel(topic, channel, |c| c.in_flight.len())
            .unwrap_or(0)
    }

    /// topic 暂存（尚无 channel）的消息数
    pub fn backlog(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(|t| t.backlog.len())
            .unwrap_or(0)
    }

    /// nsqd `/stats?format=json` 形状的统计
    pub fn stats_json(&self, topic: Option<&str>) -> Value {
        let topics = self.topics.lock();
        let mut names: Vec<&String> = topics
            .keys()
            .filter(|name| topic.is_none_or(|t| t == name.as_str()))
            .collect();
        names.sort();
        json!({
            "version": "memory",
            "health": "OK",
            "topics": names
                .into_iter()
                .filter_map(|name| topics.get(name).map(|t| t.to_json(name)))
                .collect::<Vec<_>>(),
        })
    }

    fn with_channel<T>(
        &self,
        topic: &str,
        channel: &str,
        f: impl FnOnce(&mut ChannelState) -> T,
    ) -> Option<T> {
        let mut topics = self.topics.lock();
        topics
            .get_mut(topic)
            .and_then(|t| t.channels.get_mut(channel))
            .map(f)
    }

    /// 取出下一条就绪消息并标记为在途；没有就绪消息时返回下次唤醒时间
    fn next_ready(&self, topic: &str, channel: &str) -> Result<InboundMessage, Option<Instant>> {
        let msg_timeout = self.msg_timeout;
        self.with_channel(topic, channel, |state| {
            let now = Instant::now();
            state.promote(now);
            match state.ready.pop_front() {
                Some(message) => {
                    let in_flight = InFlight {
                        expires_at: now + msg_timeout,
                        message: message.clone(),
                    };
                    state.in_flight.insert(message.id.clone(), in_flight);
                    Ok(message)
                }
                None => Err(state.next_wake()),
            }
        })
        .unwrap_or(Err(None))
    }

    fn settle(&self, topic: &str, channel: &str, id: &str, disposition: Disposition, auto_delete: bool) {
        self.with_channel(topic, channel, |state| match disposition {
            Disposition::Ack if auto_delete => {
                if state.in_flight.remove(id).is_some() {
                    state.finish_count += 1;
                }
            }
            Disposition::Ack => {}
            Disposition::Requeue { delay_ms } => {
                if let Some(InFlight { mut message, .. }) = state.in_flight.remove(id) {
                    message.attempts = message.attempts.saturating_add(1);
                    state.requeue_count += 1;
                    if delay_ms == 0 {
                        state.ready.push_back(message);
                    } else {
                        state.deferred.push(Deferred {
                            ready_at: Instant::now() + Duration::from_millis(delay_ms),
                            message,
                        });
                    }
                }
            }
        });
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &str, payload: &OutboundPayload) -> QueueResult<RawPublishResult> {
        let timestamp = now_nanos();
        let messages = payload
            .messages()
            .iter()
            .map(|m| InboundMessage {
                id: new_message_id(),
                timestamp,
                attempts: 1,
                body: m.body.clone(),
                trace_id: m.trace_id.clone(),
            })
            .collect();
        self.enqueue(topic, messages);
        Ok(RawPublishResult::success())
    }

    async fn node_stats(&self, _host: &str, topic: &str) -> QueueResult<Value> {
        Ok(self.stats_json(Some(topic)))
    }

    async fn ping(&self, _host: &str) -> QueueResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryBroker {
    async fn consume(
        &self,
        request: SubscribeRequest,
        keep: Duration,
        handler: Arc<dyn InboundHandler>,
        cancel: CancellationToken,
    ) -> QueueResult<RunOutcome> {
        self.ensure_channel(&request.topic, &request.channel);
        let deadline = Instant::now() + keep;

        loop {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Stopped);
            }
            if Instant::now() >= deadline {
                return Ok(RunOutcome::Elapsed);
            }

            let notified = self.notify.notified();
            match self.next_ready(&request.topic, &request.channel) {
                Ok(message) => {
                    let id = message.id.clone();
                    let disposition = handler.on_message(message).await;
                    self.settle(&request.topic, &request.channel, &id, disposition, request.auto_delete);
                }
                Err(wake) => {
                    let wake_at = wake.map_or(deadline, |w| w.min(deadline));
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(RunOutcome::Stopped),
                        _ = tokio::time::sleep_until(wake_at) => {}
                        _ = notified => {}
                    }
                }
            }
        }
    }

    async fn delete_message(&self, message_id: &str) -> QueueResult<bool> {
        let mut topics = self.topics.lock();
        let finished = topics
            .values_mut()
            .flat_map(|t| t.channels.values_mut())
            .find_map(|c| c.in_flight.remove(message_id).map(|_| c));
        match finished {
            Some(channel) => {
                channel.finish_count += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&self) -> QueueResult<()> {
        let mut requeued = 0usize;
        {
            let mut topics = self.topics.lock();
            for channel in topics.values_mut().flat_map(|t| t.channels.values_mut()) {
                let mut pending: Vec<_> = channel.in_flight.drain().map(|(_, f)| f.message).collect();
                pending.sort_by_key(|m| m.timestamp);
                requeued += pending.len();
                for message in pending.into_iter().rev() {
                    channel.ready.push_front(message);
                }
            }
        }

        info!(requeued, "Memory broker subscriber closed");
        Ok(())
    }
}
