use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use taskdeck::config::ClientConfig;
use taskdeck::core::entity::EntityId;
use taskdeck::core::list::{List, NewList};
use taskdeck::core::registration::Registration;
use taskdeck::core::task::{NewTask, Task, TaskStatus};
use taskdeck::core::timestamp::date_to_timestamp;
use taskdeck::notify::NotificationChannel;
use taskdeck::sync::collections::CollectionStore;
use taskdeck::{ClientError, ClientResult};

const USAGE: &str = "\
usage: taskdeck [--config <path>] <command> [args]

commands:
  login <user> <password>
  logout
  register <first> <last> <username> <email> <password> <confirm> [birth YYYY-MM-DD]
  lists
  add-list <name>
  rename-list <id> <name>
  delete-list <id>
  tasks <list-id>
  add-task <list-id> <title> [description] [due YYYY-MM-DD]
  set-status <list-id> <task-id> <todo|in-progress|done>
  delete-task <list-id> <task-id>";

/// Journal when running under systemd, stderr otherwise.
fn init_logging(config: &ClientConfig) {
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("taskdeck") {
                let max = if taskdeck::debug_logging() {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    taskdeck::set_debug_logging(config.debug_logging);

    if systemd_journal_logger::connected_to_journal() {
        if let Ok(journal) = systemd_journal_logger::JournalLog::new() {
            let journal = journal.with_syslog_identifier("taskdeck".to_string());
            if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
                // Global max must be Debug so debug logs pass when toggled
                log::set_max_level(log::LevelFilter::Debug);
                return;
            }
        }
    }

    let default_filter = if config.debug_logging {
        "taskdeck=debug,warn"
    } else {
        "taskdeck=info,warn"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = PathBuf::from(args.remove(i + 1));
            args.remove(i);
            path
        }
        Some(_) => {
            eprintln!("--config needs a path\n\n{}", USAGE);
            return ExitCode::FAILURE;
        }
        None => ClientConfig::default_path(),
    };

    let config = match ClientConfig::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    if args.is_empty() || args[0] == "--help" || args[0] == "-h" {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let store = match taskdeck::sync::connect(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let notifications = NotificationChannel::new(config.notification_timeout());

    let result = run(&store, &notifications, &args).await;
    if let Err(ref e) = result {
        notifications.push_error(e);
    }
    if let Some(n) = notifications.current() {
        println!("[{}] {}", n.severity.as_str(), n.message);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_session_terminated() {
                eprintln!("run `taskdeck login <user> <password>` to start a new session");
            }
            ExitCode::FAILURE
        }
    }
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> ClientResult<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| ClientError::Validation(format!("missing <{}>\n\n{}", name, USAGE)))
}

fn parse_date(s: &str) -> ClientResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ClientError::Validation(format!("`{}` is not a YYYY-MM-DD date", s)))
}

fn print_lists(lists: &[List]) {
    if lists.is_empty() {
        println!("(no lists)");
    }
    for list in lists {
        println!("{}\t{}", list.id, list.name);
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("(no tasks)");
    }
    let now = chrono::Utc::now();
    for task in tasks {
        let due = task
            .due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".into());
        let flag = if task.is_overdue(now) { " (overdue)" } else { "" };
        println!(
            "{}\t[{}]\t{}\tdue {}{}",
            task.id,
            task.status.as_label(),
            task.title,
            due,
            flag
        );
    }
}

async fn run(store: &CollectionStore, notify: &NotificationChannel, args: &[String]) -> ClientResult<()> {
    let session = store.session();

    match args[0].as_str() {
        "login" => {
            let user = arg(args, 1, "user")?;
            let password = arg(args, 2, "password")?;
            session.login(user, password).await?;
            store.clear();
            notify.success("Logged in");
        }
        "logout" => {
            session.logout().await;
            store.clear();
            notify.info("Logged out");
        }
        "register" => {
            let registration = Registration {
                first_name: arg(args, 1, "first")?.to_string(),
                last_name: arg(args, 2, "last")?.to_string(),
                user_name: arg(args, 3, "username")?.to_string(),
                email: arg(args, 4, "email")?.to_string(),
                password: arg(args, 5, "password")?.to_string(),
                birth_date: args.get(7).map(|s| parse_date(s)).transpose()?,
            };
            let confirmation = arg(args, 6, "confirm")?;
            session.register(&registration, confirmation).await?;
            notify.success("Registered, you can now log in");
        }
        "lists" => {
            let lists = store.fetch_lists().await?;
            print_lists(&lists);
        }
        "add-list" => {
            let list = store.add_list(&NewList::new(arg(args, 1, "name")?)).await?;
            notify.success(format!("List `{}` created ({})", list.name, list.id));
        }
        "rename-list" => {
            let list = List {
                id: EntityId::parse(arg(args, 1, "id")?),
                name: arg(args, 2, "name")?.to_string(),
            };
            store.update_list(list).await?;
            notify.success("List updated");
        }
        "delete-list" => {
            store.delete_list(&EntityId::parse(arg(args, 1, "id")?)).await?;
            notify.success("List deleted");
        }
        "tasks" => {
            let tasks = store.select_list(EntityId::parse(arg(args, 1, "list-id")?)).await?;
            print_tasks(&tasks);
        }
        "add-task" => {
            let mut task = NewTask::new(EntityId::parse(arg(args, 1, "list-id")?), arg(args, 2, "title")?);
            if let Some(description) = args.get(3) {
                task.description = description.clone();
            }
            if let Some(due) = args.get(4) {
                task.due_date = date_to_timestamp(parse_date(due)?);
            }
            let created = store.add_task(&task).await?;
            notify.success(format!("Task `{}` created ({})", created.title, created.id));
        }
        "set-status" => {
            let list_id = EntityId::parse(arg(args, 1, "list-id")?);
            let task_id = EntityId::parse(arg(args, 2, "task-id")?);
            let status: TaskStatus = arg(args, 3, "status")?.parse()?;
            store.select_list(list_id).await?;
            let task = store.set_task_status(&task_id, status).await?;
            notify.success(format!("`{}` is now {}", task.title, task.status.as_label()));
        }
        "delete-task" => {
            let list_id = EntityId::parse(arg(args, 1, "list-id")?);
            let task_id = EntityId::parse(arg(args, 2, "task-id")?);
            store.select_list(list_id).await?;
            store.delete_task(&task_id).await?;
            notify.success("Task deleted");
        }
        other => {
            return Err(ClientError::Validation(format!(
                "unknown command `{}`\n\n{}",
                other, USAGE
            )));
        }
    }
    Ok(())
}
