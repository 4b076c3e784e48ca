/// Alert delivery sinks
pub mod mandrill;
pub mod sink;

pub use mandrill::MandrillSink;
pub use sink::{AlertSink, ConsoleSink, EmailMessage, MockSink, Recipient, RecipientKind};
