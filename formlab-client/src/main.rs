//! formlab command-line client.

use formlab_client::chat_stream::ChatHandler;
use formlab_client::cli::{parse_args, Command, ConsolePrompt, PASSWORD_ENV};
use formlab_client::telemetry::init_logging;
use formlab_client::{
    AppContext, AppError, ChatTranscript, ClientConfig, Notification, NotificationLevel,
    TranscriptHandler,
};
use formlab_core::{Attachment, ChatRequest, ChatResponse, FormlabError, TaskId, TaskRecord};
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const WATCH_TICK: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let invocation = parse_args(std::env::args().skip(1))?;
    let config = ClientConfig::load(invocation.config_path.as_deref())?;
    init_logging(&config.logging)?;

    let context = AppContext::from_config(config, Arc::new(ConsolePrompt))?;
    let result = execute(&context, invocation.command).await;
    context.shutdown();
    print_notifications(&context);
    result
}

async fn execute(context: &AppContext, command: Command) -> Result<(), AppError> {
    match command {
        Command::Login { username } => {
            let password = std::env::var(PASSWORD_ENV)
                .map_err(|_| AppError::Usage(format!("set {} to log in", PASSWORD_ENV)))?;
            let login = context.auth.login(&username, &password).await?;
            println!("Logged in as {}", login.user.username);
            Ok(())
        }
        Command::Logout => {
            context.auth.logout()?;
            println!("Logged out");
            Ok(())
        }
        Command::Chat {
            message,
            file,
            top_k,
            scope,
        } => {
            let mut request = ChatRequest::new(message).with_top_k(top_k).with_scope(scope);
            if let Some(path) = file {
                request = request.with_attachment(read_attachment(&path)?);
            }
            chat(context, request).await
        }
        Command::Ingest { path } => {
            let task = context.submit_ingest(read_attachment(&path)?).await?;
            println!("Submitted {} as task #{}", task.display_name(), task.task_id);
            watch_task(context, task.task_id).await
        }
        Command::Task { id } => {
            let task = context.agent.task_status(id).await?;
            print_task(&task);
            Ok(())
        }
    }
}

/// Streams the reply to stdout while keeping the transcript current.
struct ConsoleChat<'a> {
    transcript: TranscriptHandler<'a>,
}

impl ChatHandler for ConsoleChat<'_> {
    fn on_start(&mut self) {
        self.transcript.on_start();
    }

    fn on_delta(&mut self, content: &str) {
        self.transcript.on_delta(content);
        print!("{}", content);
        let _ = std::io::stdout().flush();
    }

    fn on_done(&mut self, response: &ChatResponse) {
        self.transcript.on_done(response);
        println!();
    }

    fn on_error(&mut self, message: &str) {
        self.transcript.on_error(message);
        println!();
    }
}

async fn chat(context: &AppContext, request: ChatRequest) -> Result<(), AppError> {
    let stream = context.agent.stream_chat(&request).await?;

    let canceller = stream.canceller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let mut transcript = ChatTranscript::new();
    transcript.set_panel_visible(true);
    let mut handler = ConsoleChat {
        transcript: TranscriptHandler::new(&mut transcript),
    };
    let outcome = stream.drive(&mut handler).await;
    interrupt.abort();

    let response = outcome.map_err(FormlabError::from)?;
    if let Some(question) = &response.follow_up_question {
        println!("{}", question);
    }
    if response.degraded {
        eprintln!("(answer produced in degraded mode)");
    }
    if let Some(task) = context.track_chat_task(&response).await? {
        println!("Started task #{}", task.task_id);
        watch_task(context, task.task_id).await?;
    }
    Ok(())
}

async fn watch_task(context: &AppContext, task_id: TaskId) -> Result<(), AppError> {
    context.reconciler.set_panel_visible(true);
    loop {
        if let Some(task) = context.reconciler.task(task_id) {
            if task.status.is_terminal() {
                print_task(&task);
                return Ok(());
            }
        }
        print_notifications(context);
        tokio::select! {
            _ = tokio::time::sleep(WATCH_TICK) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped watching task #{}", task_id);
                return Ok(());
            }
        }
    }
}

fn read_attachment(path: &Path) -> Result<Attachment, AppError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::Usage(format!("not a file: {}", path.display())))?;
    Ok(Attachment::new(file_name, bytes))
}

fn print_task(task: &TaskRecord) {
    println!("Task #{} ({}) {}: {}", task.task_id, task.task_type, task.display_name(), task.status);
    if let Some(message) = &task.error_message {
        println!("  error: {}", message);
    }
}

fn print_notifications(context: &AppContext) {
    for notice in context.notifications.drain() {
        eprintln!("{}", format_notification(&notice));
    }
}

fn format_notification(notice: &Notification) -> String {
    let tag = match notice.level {
        NotificationLevel::Info => "info",
        NotificationLevel::Success => "ok",
        NotificationLevel::Warning => "warn",
        NotificationLevel::Error => "error",
    };
    match &notice.title {
        Some(title) => format!("[{}] {}: {}", tag, title, notice.message),
        None => format!("[{}] {}", tag, notice.message),
    }
}
