//! Interactive console harness.
//!
//! Wires the kernel's shell/control dispatchers to a rustyline prompt.
//! Each line is one cell; io-pub publications print inline as they
//! arrive (the stdout pump runs exactly as it does under a notebook).

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use sjk_kernel::{build, KernelConfig};
use sjk_protocol::{
    control_channel, shell_channel, ExecuteRequest, Header, IoPubSession, ReplyStatus, ShellReply,
    ShellRequest, ShutdownRequest,
};
use sjk_repl::debugger::DebuggerBackend;
use sjk_repl::io_bridge::spawn_sigint_watcher;
use sjk_repl::InterruptController;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Io-pub session that renders publications to the terminal.
struct ConsoleSession;

impl IoPubSession for ConsoleSession {
    fn send(&self, msg_type: &str, content: Value, _parent: Option<&Header>) {
        match msg_type {
            "stream" => {
                let text = content["text"].as_str().unwrap_or_default();
                if content["name"] == "stderr" {
                    eprint!("{text}");
                } else {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
            }
            "execute_result" | "display_data" => {
                if let Some(text) = content["data"]["text/plain"].as_str() {
                    println!("{text}");
                }
            }
            "error" => {
                if let Some(traceback) = content["traceback"].as_array() {
                    for line in traceback {
                        eprintln!("{}", line.as_str().unwrap_or_default());
                    }
                }
            }
            "clear_output" => {
                print!("\u{1b}[2J");
                let _ = std::io::stdout().flush();
            }
            other => debug!(msg_type = other, "unrendered io-pub message"),
        }
    }
}

/// Runs the console until EOF, `:quit`, or the batch cells are done.
pub async fn run(
    config: KernelConfig,
    backend: Box<dyn DebuggerBackend>,
    cells: Vec<String>,
) -> Result<()> {
    let (shell, control) = build(config, backend, Arc::new(ConsoleSession));
    let interrupts = control.interrupts();

    let (shell_tx, shell_dispatcher, mut shell_replies) = shell_channel(16);
    // The control channel stays wired for parity with a wire frontend;
    // in the console, interrupts arrive via Ctrl-C below.
    let (_control_tx, control_dispatcher, _control_replies) = control_channel(16);

    let _watcher = spawn_sigint_watcher(Arc::clone(&interrupts));
    let shell_task = tokio::spawn(async move {
        let mut shell = shell;
        shell_dispatcher.run(&mut shell).await;
    });
    let control_task = tokio::spawn(async move {
        control_dispatcher.run(&control).await;
    });

    if cells.is_empty() {
        let tx = shell_tx.clone();
        tokio::task::spawn_blocking(move || interactive_loop(&tx, &mut shell_replies, &interrupts))
            .await??;
    } else {
        for cell in cells {
            execute_one(&shell_tx, &mut shell_replies, &cell).await?;
        }
        shutdown(&shell_tx, &mut shell_replies).await?;
    }

    drop(shell_tx);
    let _ = shell_task.await;
    control_task.abort();
    Ok(())
}

async fn execute_one(
    shell_tx: &mpsc::Sender<ShellRequest>,
    replies: &mut mpsc::UnboundedReceiver<ShellReply>,
    code: &str,
) -> Result<()> {
    shell_tx
        .send(ShellRequest::Execute {
            header: Header::new("execute_request", "console", "user"),
            content: ExecuteRequest::code(code),
        })
        .await
        .map_err(|_| anyhow::anyhow!("shell channel closed"))?;
    while let Some(reply) = replies.recv().await {
        if let ShellReply::Execute(_, reply) = reply {
            report_reply(&reply.status, &reply.ename, &reply.evalue);
            break;
        }
    }
    Ok(())
}

async fn shutdown(
    shell_tx: &mpsc::Sender<ShellRequest>,
    replies: &mut mpsc::UnboundedReceiver<ShellReply>,
) -> Result<()> {
    shell_tx
        .send(ShellRequest::Shutdown {
            header: Header::new("shutdown_request", "console", "user"),
            content: ShutdownRequest { restart: false },
        })
        .await
        .map_err(|_| anyhow::anyhow!("shell channel closed"))?;
    while let Some(reply) = replies.recv().await {
        if matches!(reply, ShellReply::Shutdown(..)) {
            break;
        }
    }
    Ok(())
}

fn report_reply(status: &ReplyStatus, ename: &str, evalue: &str) {
    if matches!(status, ReplyStatus::Error) && !ename.is_empty() {
        eprintln!("[{ename}] {evalue}");
    }
}

/// The blocking readline loop. Ctrl-C interrupts the running cell;
/// Ctrl-D or `:quit` shuts the kernel down.
fn interactive_loop(
    shell_tx: &mpsc::Sender<ShellRequest>,
    replies: &mut mpsc::UnboundedReceiver<ShellReply>,
    interrupts: &Arc<InterruptController>,
) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    println!("SJK Swift kernel console. Submit cells line by line; %help lists magics.");

    loop {
        match editor.readline("swift> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == ":quit" || trimmed == ":exit" {
                    break;
                }
                let _ = editor.add_history_entry(&line);
                shell_tx
                    .blocking_send(ShellRequest::Execute {
                        header: Header::new("execute_request", "console", "user"),
                        content: ExecuteRequest::code(line),
                    })
                    .map_err(|_| anyhow::anyhow!("shell channel closed"))?;
                loop {
                    match replies.blocking_recv() {
                        Some(ShellReply::Execute(_, reply)) => {
                            report_reply(&reply.status, &reply.ename, &reply.evalue);
                            break;
                        }
                        Some(_) => continue,
                        None => return Ok(()),
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                interrupts.interrupt();
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    shell_tx
        .blocking_send(ShellRequest::Shutdown {
            header: Header::new("shutdown_request", "console", "user"),
            content: ShutdownRequest { restart: false },
        })
        .map_err(|_| anyhow::anyhow!("shell channel closed"))?;
    while let Some(reply) = replies.blocking_recv() {
        if matches!(reply, ShellReply::Shutdown(..)) {
            break;
        }
    }
    Ok(())
}
