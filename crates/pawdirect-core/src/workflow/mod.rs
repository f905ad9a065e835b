//! 高层工作流
//!
//! 把服务目录、连接编排器和传输组件组合成一个面向调用方的会话对象。

pub mod session;

pub use session::{P2pSession, SessionOptions};
