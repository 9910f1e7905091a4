// ==========================================
// 电动汽车充电调度系统 - 主入口
// ==========================================
// 初始化数据库与参数，启动后台充电进度驱动，Ctrl-C 退出
// ==========================================

use std::sync::Arc;

use anyhow::Context;
use ev_charging_scheduler::app::{get_default_db_path, AppState};
use ev_charging_scheduler::{logging, ChargingMode};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", ev_charging_scheduler::APP_NAME);
    tracing::info!("系统版本: {}", ev_charging_scheduler::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = tokio::task::spawn_blocking(move || AppState::new(db_path))
        .await
        .context("初始化任务异常退出")?
        .map_err(anyhow::Error::msg)
        .context("无法初始化AppState")?;

    // 启动前检查队列一致性，发现问题只告警
    for mode in ChargingMode::ALL {
        match state.maintenance.check(mode) {
            Ok(report) if !report.is_consistent() => {
                tracing::warn!(mode = %mode, issues = report.issues.len(), "启动检查发现队列位置问题");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(mode = %mode, error = %e, "启动检查失败"),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = Arc::clone(&state.driver);
    let handle = tokio::spawn(driver.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("无法监听 Ctrl-C 信号")?;
    tracing::info!("收到 Ctrl-C，正在停止");

    shutdown_tx.send(true).ok();
    handle.await.context("充电进度驱动异常退出")?;

    tracing::info!("已退出");
    Ok(())
}
