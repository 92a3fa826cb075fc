use std::sync::Arc;

use crate::auth::SessionKeys;
use crate::comm::{AppConfiguration, PushMode};
use crate::relay::{Publisher, RelayHub};
use crate::service::{
    AccountService, FanoutPublisher, Inbox, LogMailer, Mailer, MessageIngestion, SuggestionClient,
};
use crate::store::MessageStore;

/// 处理器共享的应用状态
/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub hub: Arc<RelayHub>,
    pub ingestion: MessageIngestion,
    pub inbox: Inbox,
    pub accounts: AccountService,
    pub suggestions: SuggestionClient,
    /// webhook 模式下事件由外部中继投递，本地 SSE 不可用
    pub push_mode: PushMode,
}

impl AppState {
    pub fn new(
        config: &AppConfiguration,
        store: Arc<dyn MessageStore>,
        hub: Arc<RelayHub>,
        publisher: Arc<dyn Publisher>,
        keys: SessionKeys,
    ) -> Self {
        Self::with_mailer(config, store, hub, publisher, keys, Arc::new(LogMailer))
    }

    pub fn with_mailer(
        config: &AppConfiguration,
        store: Arc<dyn MessageStore>,
        hub: Arc<RelayHub>,
        publisher: Arc<dyn Publisher>,
        keys: SessionKeys,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let fanout = FanoutPublisher::new(publisher);
        Self {
            ingestion: MessageIngestion::new(store.clone(), fanout, config.messages_max_length),
            inbox: Inbox::new(store.clone()),
            accounts: AccountService::new(store.clone(), mailer, keys, config.mail_max_attempts),
            suggestions: SuggestionClient::from_config(config),
            push_mode: config.push_mode,
            store,
            hub,
        }
    }
}
