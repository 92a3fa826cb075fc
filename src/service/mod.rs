/// 业务服务层 / Business services
pub mod account;
pub mod fanout;
pub mod inbox;
pub mod ingest;
pub mod mailer;
pub mod suggest;

pub use account::AccountService;
pub use fanout::FanoutPublisher;
pub use inbox::Inbox;
pub use ingest::MessageIngestion;
pub use mailer::{LogMailer, Mailer};
pub use suggest::SuggestionClient;
