//! # 负载均衡器模块
//!
//! 本模块提供了完整的负载均衡和健康检查功能，支持多种负载均衡算法
//! 和自动故障检测。
//!
//! ## 负载均衡算法
//!
//! - **轮询 (Round Robin)**: 依次分配请求到各个后端服务器
//! - **加权轮询 (Weighted Round Robin)**: 根据服务器权重平滑分配请求
//! - **随机 (Random)**: 随机选择后端服务器
//!
//! ## 健康检查功能
//!
//! - 周期性并发健康检查，启动时立即执行首轮探测
//! - 同一后端的并发探测自动合并为一次
//! - 转发遇到连接拒绝时触发按需探测
//! - 健康集合以原子快照方式发布，数据面读取无锁
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use steer::balancer::LoadBalancer;
//! use steer::config::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(config: Config) {
//! let shutdown = CancellationToken::new();
//! let load_balancer = LoadBalancer::new(&config, &shutdown);
//! load_balancer.start().await;
//!
//! // 选择下一个健康的后端服务器
//! if let Ok(selection) = load_balancer.select() {
//!     println!("选择的后端: {}", selection.backend.url());
//! }
//! # }
//! ```

pub mod backend; // 后端描述符、后端池与健康集合
pub mod health; // 健康检查模块，提供并发健康监控
pub mod load_balancer; // 负载均衡器门面
pub mod policy; // 负载均衡算法实现

pub use backend::{Backend, BackendPool, BackendStats, HealthStatus, HealthySet};
pub use health::HealthChecker;
pub use load_balancer::LoadBalancer;
pub use policy::{build_policy, Selection, SelectionPolicy};
