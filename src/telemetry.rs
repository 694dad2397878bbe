//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 初始化全局 tracing subscriber
///
/// 优先使用 `RUST_LOG`，未设置时使用 `default_directive`（如 `"info"`、`"flare_discovery=debug"`）。
/// 已经初始化过时返回 `false`。
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
