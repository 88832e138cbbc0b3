//! # 代理转发模块
//!
//! 本模块实现入口HTTP服务器和带重试的请求转发：
//!
//! - `server`: 入口服务器，绑定后立即接受连接，支持优雅停机
//! - `handler`: 每请求的转发状态机（选择 → 转发 → 失败分诊 → 重选）
//! - `http_client`: 共享连接池的上游HTTP客户端与有界重试循环
//!
//! 转发失败对客户端透明：只有在重试预算耗尽或没有健康后端时才
//! 返回本地合成的500。

pub mod handler;
pub mod http_client;
pub mod server;

pub use handler::ProxyHandler;
pub use http_client::{BufferedRequest, RetryCoordinator};
pub use server::ProxyServer;
