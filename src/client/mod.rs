//! 客户端库：收件箱会话、推送订阅与本地消息缓存
//! Client library: dashboard session, push subscription and local message cache

pub mod api;
pub mod cache;
pub mod session;
pub mod transport;

pub use api::{ClientError, HttpApi, MessageApi};
pub use cache::{AcceptFlag, FetchTicket, MessageCache, Removed};
pub use session::{DashboardSession, LogNotifier, NoticeLevel, Notifier};
pub use transport::{EventHandler, LocalTransport, PushTransport, SseParser, SseTransport, Subscription};
