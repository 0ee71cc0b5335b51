mod actionable_item_formatter;
mod manager;
mod processors;

pub use actionable_item_formatter::{format_card, generate_ics};
pub use manager::{BotHandle, BotSessionLookup, DeliveryQueueManager};
pub use processors::ProcessError;
