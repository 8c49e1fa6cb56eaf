mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use todos::model::{CreateTodo, TodoFilter, TodoResponse, UpdateTodo};
use todos::store::SqliteStore;
use todos::{config, ops, output, server};

fn open_store(db_path: &str) -> Result<SqliteStore> {
    SqliteStore::open(db_path).with_context(|| format!("failed to open database {db_path}"))
}

fn filter_from(completed: Option<bool>, search: Option<String>) -> Option<TodoFilter> {
    if completed.is_none() && search.is_none() {
        None
    } else {
        Some(TodoFilter { completed, search })
    }
}

fn print_todo(todo: &TodoResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(todo)?);
    } else {
        print!("{}", output::format_todo_detail(todo));
    }
    Ok(())
}

fn main() {
    config::init_logging();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let db_path = config::resolve_db_path(cli.db)?;
    config::ensure_db_dir(&db_path)?;
    let store = open_store(&db_path)?;

    match cli.command {
        Command::Init => {
            eprintln!("Initialized {db_path}");
        }

        Command::List {
            completed,
            search,
            json,
        } => {
            let filter = filter_from(completed, search);
            let todos = ops::list(&store, filter.as_ref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&todos)?);
            } else {
                print!("{}", output::format_todo_list(&todos));
            }
        }

        Command::Count { completed, search } => {
            let filter = filter_from(completed, search);
            println!("{}", ops::count(&store, filter.as_ref())?);
        }

        Command::Show { id, json } => {
            let todo = ops::get(&store, &id)?;
            print_todo(&todo, json)?;
        }

        Command::Add { title, desc, json } => {
            let todo = ops::create(
                &store,
                CreateTodo {
                    title,
                    description: desc,
                },
            )?;
            if json {
                print_todo(&todo, true)?;
            } else {
                println!("{}", todo.id);
                eprintln!("Added todo {} '{}'", todo.id, todo.title);
            }
        }

        Command::Edit {
            id,
            title,
            desc,
            completed,
            json,
        } => {
            let input = UpdateTodo {
                title,
                description: desc,
                completed,
            };
            let todo = ops::update(&store, &id, &input)?;
            if json {
                print_todo(&todo, true)?;
            } else {
                eprintln!("Updated todo {}", todo.id);
            }
        }

        Command::Rm { id } => {
            if ops::delete(&store, &id)? {
                eprintln!("Removed todo {id}");
            } else {
                eprintln!("No todo {id} to remove");
            }
        }

        Command::Toggle { id, json } => {
            let todo = ops::toggle(&store, &id)?;
            if json {
                print_todo(&todo, true)?;
            } else {
                let state = if todo.completed { "done" } else { "open" };
                eprintln!("Marked todo {} as {state}", todo.id);
            }
        }

        Command::Serve { host, port } => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
            runtime.block_on(async {
                let listener = tokio::net::TcpListener::bind((host.as_str(), port))
                    .await
                    .with_context(|| format!("failed to bind {host}:{port}"))?;
                server::run(listener, store).await.context("server error")
            })?;
        }
    }

    Ok(())
}
