//! 핸들러 모듈

pub mod connection;
pub mod http;
pub mod room;
pub mod signaling;

pub use connection::*;
pub use http::*;
pub use room::*;
pub use signaling::*;
