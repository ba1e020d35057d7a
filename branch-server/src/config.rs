//! Engine configuration
//!
//! # 环境变量
//!
//! | 环境变量 | 默认值 | 说明 |
//! |----------|--------|------|
//! | WORK_DIR | /var/lib/branch-server | 工作目录 (数据库、日志) |
//! | DB_FILE | engine.redb | 数据库文件名 |
//! | EVENT_CHANNEL_CAPACITY | 1024 | 每分支事件通道容量 |
//! | LOG_LEVEL | info | 日志级别 |
//!
//! # 示例
//!
//! ```ignore
//! WORK_DIR=/data/branch LOG_LEVEL=debug my-adapter
//! ```

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 工作目录，存储数据库和日志文件
    pub work_dir: String,
    /// 数据库文件名 (相对于工作目录)
    pub db_file: String,
    /// 每分支事件广播通道容量
    pub event_channel_capacity: usize,
    /// 日志级别: trace | debug | info | warn | error
    pub log_level: String,
}

impl EngineConfig {
    /// 从环境变量加载配置，未设置时使用默认值
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        Self {
            work_dir: std::env::var("WORK_DIR")
                .unwrap_or_else(|_| "/var/lib/branch-server".into()),
            db_file: std::env::var("DB_FILE").unwrap_or_else(|_| "engine.redb".into()),
            event_channel_capacity: std::env::var("EVENT_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }

    /// Full path of the engine database file
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join(&self.db_file)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: "/var/lib/branch-server".into(),
            db_file: "engine.redb".into(),
            event_channel_capacity: 1024,
            log_level: "info".into(),
        }
    }
}
