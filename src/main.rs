//! Flowdock Notify CLI
//!
//! 手动向 Flowdock flow 发送测试消息或普通消息

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowdock_notify::graph::GitRepositories;
use flowdock_notify::{
    BasicRenderer, FlowdockPlugin, HostContext, Identity, PropertiesSettings, StaticUsers,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "flowdock")]
#[command(about = "Post Gitblit notifications to Flowdock flows")]
#[command(version)]
struct Cli {
    /// 配置文件路径 (默认: ~/.config/flowdock-notify/flowdock.properties)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 发送者，格式 "Name <email>"
    #[arg(long = "as", global = true, default_value = "Gitblit")]
    sender: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 同步发送测试消息
    Test {
        /// 目标 flow（默认 flow 留空）
        flow: Option<String>,
    },
    /// 异步发送消息
    #[command(alias = "post")]
    Send {
        /// 目标 flow（默认 flow 留空）
        flow: Option<String>,
        /// 消息内容
        #[arg(long, short)]
        message: String,
    },
}

fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，例如: RUST_LOG=debug flowdock test
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flowdock_notify=info,flowdock=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => PropertiesSettings::load(path)?,
        None => PropertiesSettings::load_default()?,
    };
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    let host = HostContext::new(
        Arc::new(settings),
        Arc::new(StaticUsers::new()),
        Arc::new(GitRepositories::new(cwd)),
        Arc::new(BasicRenderer::new()),
    );
    let sender = Identity::parse(&cli.sender);

    let plugin = FlowdockPlugin::start(host)?;

    let result = match cli.command {
        Commands::Test { flow } => {
            let result = plugin.send_test(flow.as_deref(), &sender);
            match &result {
                Ok(()) => {
                    info!(flow = ?flow, "Test message sent");
                    println!("Test message sent to {}", flow.as_deref().unwrap_or("the default flow"));
                }
                Err(e) => error!(flow = ?flow, error = %e, "Test message failed"),
            }
            result
        }
        Commands::Send { flow, message } => plugin.post(flow.as_deref(), &sender, &message),
    };

    // 等待异步投递完成
    plugin.stop();
    result.context("failed to post to Flowdock")
}
