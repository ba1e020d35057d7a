//! Branch Server - 餐厅分支交易引擎
//!
//! # 架构概述
//!
//! The transactional core of a restaurant operations platform. Boundary
//! adapters (HTTP controllers, socket relays) call the three engines and
//! drain the broadcaster; they live outside this crate.
//!
//! - **tables** (`TableEngine`): occupancy state machine, merge, transfer
//! - **orders** (`OrderEngine`): order lifecycle, item void, stock coupling
//! - **stock** (`StockEngine`): delta application, transfer, count reconciliation
//! - **broadcast** (`EventBroadcaster`): per-branch post-commit fan-out
//! - **storage** (`EngineStorage`): embedded redb store, one write
//!   transaction per multi-step mutation
//!
//! # 模块结构
//!
//! ```text
//! branch-server/src/
//! ├── config.rs      # 配置
//! ├── logger.rs      # 日志
//! ├── error.rs       # 引擎错误
//! ├── storage.rs     # redb 存储层
//! ├── broadcast.rs   # 事件广播
//! ├── stock.rs       # 库存引擎
//! ├── orders/        # 订单引擎
//! └── tables.rs      # 桌台引擎
//! ```
//!
//! # Data Flow
//!
//! ```text
//! Boundary adapter → Engine → WriteTransaction (redb) → commit
//!                                                         │
//!                                  EventBroadcaster ◄─────┘ (strictly after)
//!                                         │
//!                                  subscribed observers (per branch)
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod logger;
pub mod orders;
pub mod stock;
pub mod storage;
pub mod tables;

// Re-export 公共类型
pub use broadcast::{EventBroadcaster, EventPublisher, NullPublisher};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use logger::{init_logger, init_logger_with_file};
pub use orders::OrderEngine;
pub use stock::StockEngine;
pub use storage::{EngineStorage, StorageError};
pub use tables::TableEngine;
