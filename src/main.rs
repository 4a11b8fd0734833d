//! Beeline - 工作流事件流消费端
//!
//! 入口：初始化日志、加载配置、创建 HTTP 传输与控制器，提交文章并把进度逐行打印到终端；Ctrl+C 取消。

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use beeline::config::{load_config, AppConfig};
use beeline::core::{RecoveryEngine, SessionStatus, WorkflowController};
use beeline::transport::HttpTransport;
use beeline::ui::ProgressPrinter;
use clap::Parser;

/// 向工作流后端提交文章并跟踪其进度
#[derive(Debug, Parser)]
#[command(name = "beeline", version, about)]
struct Args {
    /// 配置文件路径（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 后端流式端点（覆盖配置）
    #[arg(short, long)]
    endpoint: Option<String>,

    /// 从文件读取文章
    #[arg(short, long, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// 文章文本；与 --file 都未给出时从 stdin 读取
    text: Vec<String>,
}

fn read_input(args: &Args) -> anyhow::Result<String> {
    if let Some(path) = &args.file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    if !args.text.is_empty() {
        return Ok(args.text.join(" "));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read article from stdin")?;
    Ok(buf)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    beeline::observability::init();

    let args = Args::parse();
    let mut cfg = load_config(args.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    if let Some(endpoint) = &args.endpoint {
        cfg.stream.endpoint = endpoint.clone();
    }

    let input = read_input(&args)?;
    anyhow::ensure!(!input.trim().is_empty(), "Article is empty");

    let transport =
        HttpTransport::from_config(&cfg.stream).context("Failed to build HTTP transport")?;
    tracing::info!(endpoint = transport.endpoint(), "Using workflow endpoint");

    let handle = WorkflowController::new(Arc::new(transport))
        .with_recovery(RecoveryEngine::from_config(&cfg.retry))
        .with_idle_timeout(Some(Duration::from_secs(cfg.stream.idle_timeout_secs)))
        .spawn();

    let mut updates = handle.subscribe();
    let mut printer = ProgressPrinter::new();
    handle.start(input);
    handle.flush().await;

    loop {
        let snapshot = updates.borrow_and_update().clone();
        for line in printer.render(&snapshot) {
            println!("{line}");
        }
        if snapshot.status.is_settled() {
            break;
        }
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, cancelling workflow");
                handle.cancel();
            }
        }
    }

    match handle.snapshot().status {
        SessionStatus::Failed => anyhow::bail!("Workflow failed"),
        _ => Ok(()),
    }
}
