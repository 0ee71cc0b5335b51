mod auto_reply;
pub mod group_tracking;
pub mod whitelist;

pub use auto_reply::AutomaticBotReplyService;
