//! Honeycomb 命令行
//!
//! 入口：初始化日志、按配置构建 Turn Runner，逐行读取标准输入，每行作为一轮对话执行，
//! 输出回复与完整的终态 JSON。`:tools` / `:skills` 列出可用动作，`:quit` 退出。

use anyhow::Context;
use honeycomb::config::load_config;
use honeycomb::{observability, TurnInput, TurnRunner};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let runner = TurnRunner::from_config(&cfg).context("Failed to build turn runner")?;

    let app = &cfg.app;
    println!(
        "{} ready (tenant={}, user={}, thread={}). Type :quit to exit.",
        app.name, app.default_tenant, app.default_user, app.default_thread
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":tools" => {
                let tools = runner.tool_descriptors();
                println!("{}", serde_json::to_string_pretty(&tools)?);
                continue;
            }
            ":skills" => {
                let skills = runner.skill_descriptors();
                println!("{}", serde_json::to_string_pretty(&skills)?);
                continue;
            }
            _ => {}
        }

        let input = TurnInput::new(
            &app.default_tenant,
            &app.default_user,
            &app.default_thread,
            line,
        );
        let state = runner.run(input).await;
        println!("{}", state.response);
        println!("{}", serde_json::to_string_pretty(&state)?);
    }

    Ok(())
}
