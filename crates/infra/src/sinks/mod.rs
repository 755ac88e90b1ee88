mod bus;
mod handler;
mod http_callback;

pub use bus::BusSink;
pub use handler::HandlerSink;
pub use http_callback::HttpCallbackSink;
