//! tsunagi CLI - コマンドラインインターフェース
//!
//! GDB/LLDB-MI を MI プロトコルで操作する tsunagi のREPLインターフェース

use anyhow::Result;
use clap::{Parser, ValueEnum};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tsunagi_core::{
    Command, Debugger, DebuggerKind, Event, EventCategory, InScope, SessionConfig, StopEvent,
    StopReason, ThreadEvent, ThreadState, WatchOptions,
};

/// tsunagi - MI debugger front-end
#[derive(Parser)]
#[command(name = "tsunagi")]
#[command(version = "0.1.0")]
#[command(about = "Drive GDB or LLDB through the Machine Interface", long_about = None)]
struct Cli {
    /// Debugger flavour to launch
    #[arg(long, value_enum, default_value_t = DebuggerArg::Gdb)]
    debugger: DebuggerArg,

    /// Path to the debugger executable
    #[arg(long)]
    debugger_path: Option<PathBuf>,

    /// Executable to debug
    binary: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DebuggerArg {
    Gdb,
    LldbMi,
}

impl From<DebuggerArg> for DebuggerKind {
    fn from(arg: DebuggerArg) -> Self {
        match arg {
            DebuggerArg::Gdb => DebuggerKind::Gdb,
            DebuggerArg::LldbMi => DebuggerKind::LldbMi,
        }
    }
}

fn main() -> Result<()> {
    // ログは stderr へ
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("tsunagi - MI debugger front-end");
    println!("Version 0.1.0");
    println!();

    let cli = Cli::parse();
    let runtime = Runtime::new()?;
    let debugger = runtime.block_on(init_debugger(&cli))?;
    subscribe_output(&debugger);

    let result = run_repl(&runtime, &debugger);
    runtime.block_on(debugger.end());
    result
}

/// デバッガを起動し、指定があれば実行ファイルを読み込む
async fn init_debugger(cli: &Cli) -> Result<Debugger> {
    let mut config = SessionConfig::new(cli.debugger.into());
    if let Some(path) = &cli.debugger_path {
        config = config.program(path);
    }

    info!(kind = ?config.kind, program = %config.program.display(), "launching debugger");
    println!("Launching debugger: {}", config.program.display());
    let debugger = Debugger::launch(&config).await?;

    if let Some(binary) = &cli.binary {
        debugger.load_binary(binary).await?;
        println!("Loaded {}", binary.display());
        println!("Set breakpoints and use 'run' to start the program");
    }
    println!();

    Ok(debugger)
}

/// 非同期に届く出力・停止・診断を表示する
fn subscribe_output(debugger: &Debugger) {
    let session = debugger.session();

    for category in [EventCategory::ConsoleOutput, EventCategory::TargetOutput] {
        session.subscribe(category, |event| {
            if let Event::Stream(text) = event {
                print!("{}", render_stream(text));
            }
        });
    }

    session.subscribe(EventCategory::ExecAsync, |event| {
        if let Some(stop) = StopEvent::from_event(event) {
            print_stop(&stop);
        }
    });

    session.subscribe(EventCategory::NotifyAsync, |event| {
        match ThreadEvent::from_event(event) {
            Some(ThreadEvent::Created { id, .. }) => println!("[New thread {}]", id),
            Some(ThreadEvent::Exited { id, .. }) => println!("[Thread {} exited]", id),
            _ => {}
        }
    });

    session.subscribe(EventCategory::Diagnostic, |event| match event {
        Event::Diagnostic(diagnostic) => eprintln!("warning: {}", diagnostic),
        Event::Exited => println!("Debugger session ended"),
        _ => {}
    });
}

/// コンソール出力の `\n` `\t` を表示用に戻す
fn render_stream(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn print_stop(stop: &StopEvent) {
    println!();
    match &stop.reason {
        StopReason::BreakpointHit { number } => match number {
            Some(number) => println!("Breakpoint {} hit", number),
            None => println!("Breakpoint hit"),
        },
        StopReason::EndSteppingRange => {}
        StopReason::FunctionFinished => println!("Function finished"),
        StopReason::SignalReceived { name } => {
            println!("Received signal: {}", name.as_deref().unwrap_or("unknown"))
        }
        StopReason::Exited { code } => match code {
            Some(code) => println!("Process exited with code {}", code),
            None => println!("Process exited"),
        },
        StopReason::ExitedNormally => println!("Process exited normally"),
        StopReason::ExitedSignalled { name } => println!(
            "Process terminated by signal: {}",
            name.as_deref().unwrap_or("unknown")
        ),
        StopReason::Other(reason) => println!("Stopped: {}", reason),
        StopReason::Unspecified => println!("Stopped"),
    }

    if let Some(frame) = &stop.frame {
        let func = frame.func.as_deref().unwrap_or("??");
        match frame.location() {
            Some(location) => println!("  at {} ({})", func, location),
            None => println!("  at {} [{}]", func, frame.addr.as_deref().unwrap_or("?")),
        }
    }
}

/// REPLループを実行する
fn run_repl(runtime: &Runtime, debugger: &Debugger) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(tsunagi) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match Command::parse(line) {
                    Some(Command::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Some(command) => {
                        if let Err(e) = runtime.block_on(handle_command(debugger, command)) {
                            eprintln!("Error: {}", e);
                        }
                    }
                    None => {
                        println!("Unknown command: {}", line);
                        println!("Type 'help' for available commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

async fn handle_command(debugger: &Debugger, command: Command) -> Result<()> {
    debug!(?command, "repl command");
    match command {
        Command::File(path) => {
            debugger.load_binary(&path).await?;
            println!("Loaded {}", path);
        }
        Command::Run => debugger.run().await?,
        Command::Break(location) => handle_break(debugger, &location).await?,
        Command::Delete(id) => {
            debugger.remove_breakpoint(id).await?;
            println!("Deleted breakpoint {}", id);
        }
        Command::Continue => {
            println!("Continuing execution...");
            debugger.resume().await?;
        }
        Command::Step => debugger.step_into().await?,
        Command::Next => debugger.step_over().await?,
        Command::Finish => debugger.step_out().await?,
        Command::Interrupt => debugger.interrupt().await?,
        Command::Backtrace => handle_backtrace(debugger).await?,
        Command::Locals => handle_locals(debugger).await?,
        Command::Print(expr) => {
            let value = debugger.evaluate_expression(&expr).await?;
            println!("{} = {}", expr, value);
        }
        Command::Examine { address, length } => handle_examine(debugger, address, length).await?,
        Command::Registers => handle_registers(debugger).await?,
        Command::Watch(expr) => {
            let watch = debugger.add_watch(&expr, &WatchOptions::default()).await?;
            println!(
                "Watch {}: {} = {}",
                watch.name,
                expr,
                watch.value.as_deref().unwrap_or("{...}")
            );
        }
        Command::Watches => handle_watches(debugger).await?,
        Command::Unwatch(name) => {
            debugger.remove_watch(&name).await?;
            println!("Deleted watch {}", name);
        }
        Command::Threads => handle_threads(debugger).await?,
        Command::Thread(id) => {
            debugger.select_thread(id).await?;
            println!("Switched to thread {}", id);
        }
        Command::Raw(text) => {
            let results = debugger.session().send_command(&text).await?;
            println!("{}", tsunagi_core::Value::Tuple(results));
        }
        Command::Help => print_help(),
        Command::Quit => {}
    }

    Ok(())
}

/// Breakコマンドを処理する
async fn handle_break(debugger: &Debugger, location: &str) -> Result<()> {
    let bp = debugger.add_breakpoint(location).await?;

    let place = match (&bp.func, &bp.file, bp.line) {
        (Some(func), Some(file), Some(line)) => format!("{} ({}:{})", func, file, line),
        (Some(func), _, _) => func.clone(),
        _ => bp.addr.clone().unwrap_or_else(|| location.to_string()),
    };
    println!("Breakpoint {} set at {}", bp.id, place);

    for loc in &bp.locations {
        println!(
            "  {}: {} {}",
            loc.number,
            loc.addr.as_deref().unwrap_or("?"),
            loc.func.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

/// Backtraceコマンドを処理する
async fn handle_backtrace(debugger: &Debugger) -> Result<()> {
    let frames = debugger.stack_frames().await?;
    if frames.is_empty() {
        println!("No stack.");
        return Ok(());
    }

    for frame in &frames {
        let func = frame.func.as_deref().unwrap_or("??");
        let addr = frame.addr.as_deref().unwrap_or("?");
        match frame.location() {
            Some(location) => println!("#{:<3} {} in {} at {}", frame.level, addr, func, location),
            None => println!("#{:<3} {} in {}", frame.level, addr, func),
        }
    }
    Ok(())
}

/// Localsコマンドを処理する
async fn handle_locals(debugger: &Debugger) -> Result<()> {
    let variables = debugger.locals().await?;
    if variables.is_empty() {
        println!("No locals.");
        return Ok(());
    }

    for var in &variables {
        let ty = var.type_name.as_deref().unwrap_or("?");
        match &var.value {
            Some(value) => println!("  {}: {} = {}", var.name, ty, value),
            None => println!("  {}: {} = {{...}}", var.name, ty),
        }
    }
    Ok(())
}

/// xコマンドを処理する（16バイトずつ表示）
async fn handle_examine(debugger: &Debugger, address: u64, length: usize) -> Result<()> {
    let blocks = debugger.read_memory(address, length).await?;

    for block in &blocks {
        let Some(bytes) = block.bytes() else {
            println!("{}: {}", block.begin, block.contents);
            continue;
        };
        let base = block.begin_address()?;
        for (i, chunk) in bytes.chunks(16).enumerate() {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            println!("0x{:016x}: {}", base + (i * 16) as u64, hex.join(" "));
        }
    }
    Ok(())
}

/// Registersコマンドを処理する
async fn handle_registers(debugger: &Debugger) -> Result<()> {
    let names = debugger.register_names().await?;
    let names: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .collect();

    for row in names.chunks(8) {
        println!("  {}", row.join(" "));
    }
    Ok(())
}

/// watchesコマンドを処理する
async fn handle_watches(debugger: &Debugger) -> Result<()> {
    let changes = debugger.update_watches().await?;
    if changes.is_empty() {
        println!("No changes.");
        return Ok(());
    }

    for change in &changes {
        match change.in_scope {
            InScope::Yes => println!(
                "  {} = {}",
                change.name,
                change.value.as_deref().unwrap_or("{...}")
            ),
            InScope::No => println!("  {} is out of scope", change.name),
            InScope::Invalid => println!("  {} is no longer valid", change.name),
        }
    }
    Ok(())
}

/// threadsコマンドを処理する
async fn handle_threads(debugger: &Debugger) -> Result<()> {
    let list = debugger.threads().await?;
    if list.threads.is_empty() {
        println!("No threads.");
        return Ok(());
    }

    for thread in &list.threads {
        let marker = if Some(thread.id) == list.current_thread_id {
            '*'
        } else {
            ' '
        };
        let place = match (&thread.state, &thread.frame) {
            (ThreadState::Running, _) => "(running)".to_string(),
            (ThreadState::Stopped, Some(frame)) => {
                let func = frame.func.as_deref().unwrap_or("??");
                match frame.location() {
                    Some(location) => format!("{} at {}", func, location),
                    None => func.to_string(),
                }
            }
            (ThreadState::Stopped, None) => "(stopped)".to_string(),
        };
        println!("{} {:<3} {} {}", marker, thread.id, thread.target_id, place);
    }
    Ok(())
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help (h, ?)       - Show this help message");
    println!("  quit/exit/q       - Exit the debugger");
    println!();
    println!("Program commands:");
    println!("  file <path>       - Load an executable");
    println!("  run               - Start the program");
    println!("  interrupt (i)     - Stop the running program");
    println!();
    println!("Breakpoint commands:");
    println!("  break (b) <loc>   - Set breakpoint at function, file:line or *address");
    println!("  delete (d) <n>    - Delete breakpoint n");
    println!();
    println!("Execution commands:");
    println!("  continue (c)      - Continue execution");
    println!("  step (s)          - Step into");
    println!("  next (n)          - Step over");
    println!("  finish (f)        - Run until the current function returns");
    println!();
    println!("Inspection commands:");
    println!("  backtrace (bt)    - Show the call stack");
    println!("  locals (l)        - Show local variables");
    println!("  print (p) <expr>  - Evaluate an expression");
    println!("  x <addr> [len]    - Examine memory");
    println!("  registers (regs)  - List register names");
    println!("  watch (w) <expr>  - Watch an expression");
    println!("  watches           - Show watches that changed");
    println!("  unwatch <name>    - Delete a watch");
    println!("  threads           - List threads");
    println!("  thread (t) <n>    - Switch to thread n");
    println!("  mi <command>      - Send a raw MI command");
    println!();
    println!("Examples:");
    println!("  break main");
    println!("  break main.c:12");
    println!("  x 0x7fffffffe0f0 32");
    println!("  mi -gdb-version");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_stream() {
        assert_eq!(render_stream(r"Continuing.\n"), "Continuing.\n");
        assert_eq!(render_stream(r"a\tb"), "a\tb");
        assert_eq!(render_stream(r"keep \x and \"), r"keep \x and \");
    }
}
