//! Command handlers for suportectl.

use anyhow::{bail, Result};
use owo_colors::OwoColorize;
use std::path::Path;

use suporte_common::router;
use suporte_common::{
    Config, EventSender, OllamaClient, RepairPipeline, ScriptExecutor, ServerStatus, Session, Tool,
};

/// Handle the classify command.
pub async fn classify(config: &Config, text: &str, run_matched: bool) -> Result<()> {
    let client = OllamaClient::new(config.ollama.clone())?;
    let result = router::classify(text, &client).await;

    if result.matched {
        println!("{} {}", "ferramenta:".dimmed(), result.tool.to_string().bright_green());
    } else {
        println!("{} {}", "ferramenta:".dimmed(), "nenhuma".yellow());
    }
    println!("{}", result.message);

    if run_matched && result.matched {
        println!();
        dispatch(config, result.tool, None).await?;
    }
    Ok(())
}

/// Handle the chat command.
pub async fn chat(config: &Config, session: &Session, message: &str) -> Result<()> {
    let client = OllamaClient::new(config.ollama.clone())?;

    if session.is_authenticated() {
        println!("{} {}", "olá,".dimmed(), session.display_name.bold());
    }

    if !client.is_running().await {
        println!("{}", router::SERVICE_UNAVAILABLE_MESSAGE.bright_red());
        return Ok(());
    }

    let turn = client.chat(message).await?;
    println!("{}", turn.reply);

    if let Some(label) = turn.suggested_label {
        println!();
        println!("{} {}", "sugestão:".dimmed(), label.bright_cyan());
    }
    Ok(())
}

/// Handle the run command.
pub async fn run(config: &Config, tool_name: &str, target: Option<&Path>) -> Result<()> {
    let Some(tool) = Tool::from_cli_name(tool_name) else {
        bail!("ferramenta desconhecida: {tool_name}");
    };
    dispatch(config, tool, target).await
}

/// Route a tool to its backend. The spreadsheet tool goes through the
/// repair pipeline, everything else through the script executor.
async fn dispatch(config: &Config, tool: Tool, target: Option<&Path>) -> Result<()> {
    match tool {
        Tool::UnlockSpreadsheet => {
            let Some(target) = target else {
                bail!("informe o arquivo da planilha com --target");
            };
            repair(config, target).await
        }
        Tool::None => bail!("nenhuma ferramenta para executar"),
        _ => run_script(config, tool, target).await,
    }
}

async fn run_script(config: &Config, tool: Tool, target: Option<&Path>) -> Result<()> {
    let executor = ScriptExecutor::new(config.scripts.dir.clone());

    println!("{} {}...", "executando".dimmed(), tool.to_string().bold());
    let result = executor.run(tool, target).await?;

    for line in result.output.lines() {
        println!("  {line}");
    }

    if result.effectively_succeeded(tool) {
        println!("{}", "concluído com sucesso".bright_green());
    } else {
        println!(
            "{} (código {})",
            "falhou".bright_red(),
            result.exit_code
        );
    }
    if result.reboot_required {
        println!("{}", "reinicie o computador para concluir".yellow().bold());
    }
    Ok(())
}

/// Handle the repair command: run the unlock pipeline and render its
/// event stream as it happens.
pub async fn repair(config: &Config, file: &Path) -> Result<()> {
    let pipeline = RepairPipeline::from_config(config);
    let (events, mut rx) = EventSender::channel();

    let target = file.to_path_buf();
    let run = tokio::spawn(async move { pipeline.run(&target, &events).await });

    while let Some(event) = rx.recv().await {
        println!("{}", event.to_display_line());
    }

    let result = run.await?;

    println!();
    if !result.succeeded {
        println!("{}", result.summary.bright_red());
    } else if result.has_warnings() {
        println!("{}", result.summary.yellow());
        for error in &result.errors {
            println!("  {} {}", "aviso:".yellow(), error);
        }
    } else {
        println!("{}", result.summary.bright_green());
    }
    Ok(())
}

/// Handle the status command.
pub async fn status(config: &Config) -> Result<()> {
    let client = OllamaClient::new(config.ollama.clone())?;

    let ollama_up = client.is_running().await;
    let server_up =
        suporte_common::probe::is_reachable(&config.server.addr(), config.server.probe_timeout())
            .await;

    print_kv("ollama", &config.ollama.endpoint, ollama_up);
    print_kv("servidor", &config.server.addr(), server_up);
    Ok(())
}

fn print_kv(name: &str, detail: &str, up: bool) {
    let state = if up {
        "online".bright_green().to_string()
    } else {
        "offline".bright_red().to_string()
    };
    println!("{name:<10} {state}   {}", detail.dimmed());
}

/// Handle the watch command: print every connectivity change until
/// interrupted.
pub async fn watch(config: &Config) -> Result<()> {
    let watcher = suporte_common::probe::ConnectivityWatcher::spawn(
        config.server.addr(),
        config.server.probe_timeout(),
        config.server.check_interval(),
    );
    let mut rx = watcher.subscribe();

    println!(
        "{} {} (Ctrl+C para sair)",
        "monitorando".dimmed(),
        config.server.addr()
    );

    let mut last = ServerStatus::Connecting;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *rx.borrow();
                if status != last {
                    let line = match status {
                        ServerStatus::Connected => "conectado".bright_green().to_string(),
                        ServerStatus::Disconnected => "desconectado".bright_red().to_string(),
                        ServerStatus::Connecting => "conectando".yellow().to_string(),
                    };
                    println!("servidor: {line}");
                    last = status;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watcher.stop().await;
    Ok(())
}
