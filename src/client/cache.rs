//! 客户端消息缓存
//!
//! 三条写入路径：全量拉取 (`replace_all`)、推送插入 (`insert_one`)、乐观删除
//! (`remove_by_id`)。可见列表 = 最近一次服务端快照 ± 尚未被服务端否定的本地修改。
//!
//! Local message cache with three write paths (fetch, push, delete) that stay
//! consistent with each other. Fetch snapshots are versioned by a [`FetchTicket`]:
//! pushes received after a fetch began survive that fetch, stale snapshots are
//! dropped, and optimistically removed ids are not resurrected by snapshots that
//! were taken before the server confirmed the delete.

use std::collections::{HashMap, HashSet};

use crate::domain::MessageView;

type Generation = u64;

/// 一次全量拉取的凭证，拉取开始前领取
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(Generation);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Fetched,
    /// 推送到达时的拉取代数
    Pushed(Generation),
}

#[derive(Debug, Clone)]
struct Entry {
    message: MessageView,
    origin: Origin,
}

/// 乐观删除后留下的墓碑
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tombstone {
    /// 等待服务端确认
    Pending,
    /// 服务端已确认；此代及更早开始的快照仍可能包含它
    Confirmed(Generation),
}

/// 被乐观移除的消息，用于失败回滚
#[derive(Debug, Clone, PartialEq)]
pub struct Removed {
    pub index: usize,
    pub message: MessageView,
    origin: Origin,
}

#[derive(Debug, Default)]
pub struct MessageCache {
    /// 头部为最新插入
    entries: Vec<Entry>,
    fetch_generation: Generation,
    applied_generation: Generation,
    tombstones: HashMap<String, Tombstone>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始一次全量拉取
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.fetch_generation += 1;
        FetchTicket(self.fetch_generation)
    }

    /// 用快照替换列表
    ///
    /// 比已应用快照更旧的凭证被忽略并返回 false。拉取开始后到达、且不在快照中的推送消息保留。
    pub fn replace_all(&mut self, ticket: FetchTicket, snapshot: Vec<MessageView>) -> bool {
        if ticket.0 < self.applied_generation {
            return false;
        }
        self.applied_generation = ticket.0;

        let tombstones = &self.tombstones;
        let hidden = |id: &str| match tombstones.get(id) {
            Some(Tombstone::Pending) => true,
            Some(Tombstone::Confirmed(g)) => *g >= ticket.0,
            None => false,
        };

        let snapshot_ids: HashSet<&str> = snapshot.iter().map(|m| m.id.as_str()).collect();
        let mut seen: HashSet<String> = HashSet::with_capacity(snapshot.len());
        let mut entries = Vec::with_capacity(snapshot.len());

        for entry in &self.entries {
            if let Origin::Pushed(g) = entry.origin {
                if g >= ticket.0
                    && !snapshot_ids.contains(entry.message.id.as_str())
                    && seen.insert(entry.message.id.clone())
                {
                    entries.push(entry.clone());
                }
            }
        }
        for message in snapshot {
            if hidden(&message.id) || !seen.insert(message.id.clone()) {
                continue;
            }
            entries.push(Entry {
                message,
                origin: Origin::Fetched,
            });
        }
        self.entries = entries;

        // 此快照之前确认的删除不会再出现
        self.tombstones
            .retain(|_, t| !matches!(t, Tombstone::Confirmed(g) if *g < ticket.0));
        true
    }

    /// 推送插入：头部插入，按 id 幂等
    pub fn insert_one(&mut self, message: MessageView) -> bool {
        if self.tombstones.contains_key(&message.id) || self.contains(&message.id) {
            return false;
        }
        self.entries.insert(
            0,
            Entry {
                message,
                origin: Origin::Pushed(self.fetch_generation),
            },
        );
        true
    }

    /// 乐观删除；返回用于回滚的记录
    pub fn remove_by_id(&mut self, id: &str) -> Option<Removed> {
        self.tombstones.insert(id.to_string(), Tombstone::Pending);
        let index = self.entries.iter().position(|e| e.message.id == id)?;
        let entry = self.entries.remove(index);
        Some(Removed {
            index,
            message: entry.message,
            origin: entry.origin,
        })
    }

    /// 服务端确认删除（包括服务端报告不存在）
    pub fn confirm_removed(&mut self, id: &str) {
        self.tombstones
            .insert(id.to_string(), Tombstone::Confirmed(self.fetch_generation));
    }

    /// 删除失败：放回原位置
    pub fn restore(&mut self, removed: Removed) {
        self.tombstones.remove(&removed.message.id);
        if self.contains(&removed.message.id) {
            return;
        }
        let index = removed.index.min(self.entries.len());
        self.entries.insert(
            index,
            Entry {
                message: removed.message,
                origin: removed.origin,
            },
        );
    }

    /// 删除失败但本地本来就没有该消息
    pub fn forget_removal(&mut self, id: &str) {
        self.tombstones.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.message.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 展示视图：按时间倒序、按 id 去重
    pub fn messages(&self) -> Vec<MessageView> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        let mut messages: Vec<MessageView> = self
            .entries
            .iter()
            .filter(|e| seen.insert(e.message.id.as_str()))
            .map(|e| e.message.clone())
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages
    }
}

/// 客户端观察到的接收开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptFlag {
    #[default]
    Unknown,
    On,
    Off,
}

impl AcceptFlag {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::On
        } else {
            Self::Off
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::On => Some(true),
            Self::Off => Some(false),
        }
    }

    /// 翻转；未知状态不可翻转
    pub fn toggled(self) -> Option<Self> {
        self.as_bool().map(|v| Self::from_bool(!v))
    }
}
