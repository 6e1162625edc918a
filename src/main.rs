use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use skysync::backend::{RcloneBackend, TransferBackend};
use skysync::config::Config;
use skysync::encryption::EncryptionStore;
use skysync::engine::{TransferEngine, TransferItem, TransferRequest};
use skysync::logging;
use skysync::remote::Remote;
use skysync::remotes::RemoteStore;
use skysync::schedule::{ScheduleFrequency, SyncSchedule};
use skysync::scheduler::Scheduler;
use skysync::store::{HistoryQuery, TaskStore};
use skysync::task::TaskState;

/// A parsed CLI endpoint: the remote it addresses plus the path on it
struct Endpoint {
	remote: Remote,
	path: String,
}

/// Resolve "Remote:path" against the registry; bare paths are local
fn parse_endpoint(remotes: &RemoteStore, spec: &str) -> Result<Endpoint, Box<dyn Error>> {
	if let Some((name, path)) = spec.split_once(':') {
		if !name.is_empty() && !name.starts_with('/') && !name.starts_with('.') {
			let remote = remotes
				.find_by_name(name)
				.ok_or_else(|| format!("unknown remote '{}' (see `skysync remotes list`)", name))?;
			return Ok(Endpoint { remote, path: path.to_string() });
		}
	}
	Ok(Endpoint { remote: Remote::local(), path: spec.to_string() })
}

fn parent_of(path: &str) -> String {
	Path::new(path)
		.parent()
		.map(|p| p.to_string_lossy().to_string())
		.filter(|p| !p.is_empty())
		.unwrap_or_else(|| "/".to_string())
}

fn parse_state(text: &str) -> Option<TaskState> {
	match text.to_lowercase().as_str() {
		"pending" => Some(TaskState::Pending),
		"running" => Some(TaskState::Running),
		"paused" => Some(TaskState::Paused),
		"completed" => Some(TaskState::Completed),
		"failed" => Some(TaskState::Failed),
		"cancelled" => Some(TaskState::Cancelled),
		_ => None,
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	logging::init_tracing();

	let matches = Command::new("skysync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Move, mirror and back up files across cloud storage backends")
		.subcommand_required(true)
		.subcommand(
			Command::new("remotes").about("Configured remotes").subcommand(
				Command::new("list").about("List configured remotes"),
			),
		)
		.subcommand(Command::new("tasks").about("Show active tasks"))
		.subcommand(
			Command::new("history")
				.about("Show task history")
				.arg(Arg::new("query").long("query").value_name("TEXT").help("Substring filter"))
				.arg(Arg::new("state").long("state").value_name("STATE").help("State filter")),
		)
		.subcommand(
			Command::new("transfer")
				.about("Transfer a file or directory between endpoints")
				.arg(Arg::new("source").required(true).help("Source (Remote:path or local path)"))
				.arg(Arg::new("dest").required(true).help("Destination (Remote:path or local path)"))
				.arg(Arg::new("name").long("name").value_name("NAME").help("Task name"))
				.arg(
					Arg::new("encrypt-source")
						.long("encrypt-source")
						.action(ArgAction::SetTrue)
						.help("Read the source through its encryption overlay"),
				)
				.arg(
					Arg::new("encrypt-dest")
						.long("encrypt-dest")
						.action(ArgAction::SetTrue)
						.help("Write the destination through its encryption overlay"),
				),
		)
		.subcommand(
			Command::new("schedule")
				.about("Manage schedules")
				.subcommand_required(true)
				.subcommand(Command::new("list").about("List schedules"))
				.subcommand(
					Command::new("add")
						.about("Add a schedule")
						.arg(Arg::new("name").required(true))
						.arg(Arg::new("source").required(true).help("Source (Remote:path)"))
						.arg(Arg::new("dest").required(true).help("Destination (Remote:path)"))
						.arg(
							Arg::new("frequency")
								.long("frequency")
								.value_name("FREQ")
								.default_value("daily")
								.help("hourly, daily, weekly or custom"),
						)
						.arg(Arg::new("hour").long("hour").value_name("0-23"))
						.arg(Arg::new("minute").long("minute").value_name("0-59"))
						.arg(
							Arg::new("interval")
								.long("interval")
								.value_name("MINUTES")
								.help("Interval for custom frequency (minimum 5)"),
						)
						.arg(
							Arg::new("days")
								.long("days")
								.value_name("1-7,...")
								.help("Weekdays for weekly frequency (1=Sunday)"),
						),
				)
				.subcommand(
					Command::new("remove")
						.about("Delete a schedule")
						.arg(Arg::new("name").required(true)),
				)
				.subcommand(
					Command::new("run")
						.about("Run a schedule now")
						.arg(Arg::new("name").required(true)),
				)
				.subcommand(
					Command::new("enable")
						.about("Enable a schedule")
						.arg(Arg::new("name").required(true)),
				)
				.subcommand(
					Command::new("disable")
						.about("Disable a schedule")
						.arg(Arg::new("name").required(true)),
				),
		)
		.subcommand(
			Command::new("ls")
				.about("List a directory on a remote")
				.arg(Arg::new("target").required(true).help("Remote:path")),
		)
		.subcommand(
			Command::new("rm")
				.about("Delete a file or directory on a remote")
				.arg(Arg::new("target").required(true).help("Remote:path"))
				.arg(
					Arg::new("recursive")
						.short('r')
						.long("recursive")
						.action(ArgAction::SetTrue)
						.help("Delete a directory and its contents"),
				),
		)
		.subcommand(
			Command::new("mv")
				.about("Rename a file or directory on a remote")
				.arg(Arg::new("from").required(true).help("Remote:path"))
				.arg(Arg::new("to").required(true).help("New path on the same remote")),
		)
		.subcommand(
			Command::new("mkdir")
				.about("Create a directory on a remote")
				.arg(Arg::new("target").required(true).help("Remote:path")),
		)
		.subcommand(Command::new("daemon").about("Run the scheduler until interrupted"))
		.get_matches();

	let config = Config::load()?;
	config.ensure_state_dir()?;

	let backend = Arc::new(RcloneBackend::new(&config));
	let store = TaskStore::open(&config.state_dir, config.history_limit)?;
	let encryption = EncryptionStore::open(&config.state_dir)?;
	let remotes = RemoteStore::open(&config.state_dir)?;
	let engine = TransferEngine::new(backend.clone(), store.clone(), encryption);
	let scheduler = Scheduler::open(
		&config.state_dir,
		engine.clone(),
		remotes.clone(),
		config.scheduler_tick_secs,
	)?;

	match matches.subcommand() {
		Some(("remotes", _)) => {
			let mut listed = remotes.list();
			if listed.is_empty() {
				listed.push(Remote::local());
			}
			for remote in listed {
				let status = if remote.is_configured { "ready" } else { "unconfigured" };
				let lock = if remote.encrypted { " [encrypted]" } else { "" };
				println!("{:<24} {:<20} {}{}", remote.name, remote.kind.display_name(), status, lock);
			}
		}
		Some(("tasks", _)) => {
			for task in store.active() {
				println!(
					"{}  {:<10} {:>4}%  {}  {} -> {}",
					task.id,
					format!("{:?}", task.state).to_lowercase(),
					(task.progress * 100.0) as u32,
					task.name,
					task.source_remote,
					task.destination_remote,
				);
			}
		}
		Some(("history", sub)) => {
			let query = HistoryQuery {
				text: sub.get_one::<String>("query").cloned(),
				state: sub.get_one::<String>("state").and_then(|s| parse_state(s)),
				..Default::default()
			};
			for task in store.search_history(&query) {
				let when = task
					.completed_at
					.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
					.unwrap_or_else(|| "--".to_string());
				println!(
					"{}  {:<10} {}  {} ({} files, {} skipped){}",
					when,
					format!("{:?}", task.state).to_lowercase(),
					task.name,
					task.source_remote,
					task.files_transferred,
					task.skipped,
					task.error_message.map(|e| format!("  [{}]", e)).unwrap_or_default(),
				);
			}
		}
		Some(("transfer", sub)) => {
			let source_spec = sub.get_one::<String>("source").expect("required");
			let dest_spec = sub.get_one::<String>("dest").expect("required");
			let source = parse_endpoint(&remotes, source_spec)?;
			let dest = parse_endpoint(&remotes, dest_spec)?;

			let item = if source.remote.kind.is_local() {
				let metadata = std::fs::metadata(&source.path)
					.map_err(|e| format!("cannot read '{}': {}", source.path, e))?;
				TransferItem {
					path: source.path.clone(),
					is_directory: metadata.is_dir(),
					size: if metadata.is_dir() { 0 } else { metadata.len() },
				}
			} else {
				TransferItem {
					path: source.path.clone(),
					is_directory: source.path.ends_with('/'),
					size: 0,
				}
			};

			let mut request = TransferRequest::new(
				vec![item],
				source.remote,
				parent_of(&source.path),
				dest.remote,
				dest.path,
			);
			request.name = sub.get_one::<String>("name").cloned();
			request.encrypt_source = sub.get_flag("encrypt-source");
			request.encrypt_destination = sub.get_flag("encrypt-dest");

			let task_id = engine.execute(request).await?;
			let task = store.get(task_id).ok_or("task vanished")?;
			match task.state {
				TaskState::Completed => {
					println!(
						"completed: {} files, {} bytes{}",
						task.files_transferred,
						task.bytes_transferred,
						if task.skipped > 0 {
							format!(" ({} skipped)", task.skipped)
						} else {
							String::new()
						}
					);
				}
				state => {
					println!(
						"{:?}: {}",
						state,
						task.error_message.unwrap_or_else(|| "see history".to_string())
					);
					std::process::exit(1);
				}
			}
		}
		Some(("schedule", sub)) => match sub.subcommand() {
			Some(("list", _)) => {
				for schedule in scheduler.list() {
					let next = schedule
						.next_run_at
						.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
						.unwrap_or_else(|| "disabled".to_string());
					println!(
						"{:<24} {:<10} next: {}  runs: {} ({} failed)",
						schedule.name,
						format!("{:?}", schedule.frequency).to_lowercase(),
						next,
						schedule.run_count,
						schedule.failure_count,
					);
				}
			}
			Some(("add", args)) => {
				let name = args.get_one::<String>("name").expect("required");
				let source = parse_endpoint(&remotes, args.get_one::<String>("source").expect("required"))?;
				let dest = parse_endpoint(&remotes, args.get_one::<String>("dest").expect("required"))?;

				let mut schedule = SyncSchedule::new(
					name.as_str(),
					source.remote.name.as_str(),
					source.path.as_str(),
					dest.remote.name.as_str(),
					dest.path.as_str(),
				);
				schedule.frequency = match args
					.get_one::<String>("frequency")
					.expect("defaulted")
					.as_str()
				{
					"hourly" => ScheduleFrequency::Hourly,
					"daily" => ScheduleFrequency::Daily,
					"weekly" => ScheduleFrequency::Weekly,
					"custom" => ScheduleFrequency::Custom,
					other => return Err(format!("unknown frequency '{}'", other).into()),
				};
				if let Some(hour) = args.get_one::<String>("hour") {
					schedule.hour = Some(hour.parse()?);
				}
				if let Some(minute) = args.get_one::<String>("minute") {
					schedule.minute = Some(minute.parse()?);
				}
				if let Some(interval) = args.get_one::<String>("interval") {
					schedule.interval_minutes = Some(interval.parse()?);
				}
				if let Some(days) = args.get_one::<String>("days") {
					let parsed: Result<std::collections::BTreeSet<u8>, _> =
						days.split(',').map(|d| d.trim().parse()).collect();
					schedule.weekdays = Some(parsed?);
				}
				scheduler.add(schedule)?;
			}
			Some(("remove", args)) => {
				let name = args.get_one::<String>("name").expect("required");
				let schedule =
					scheduler.find_by_name(name).ok_or_else(|| format!("no schedule '{}'", name))?;
				scheduler.remove(schedule.id)?;
			}
			Some(("run", args)) => {
				let name = args.get_one::<String>("name").expect("required");
				let schedule =
					scheduler.find_by_name(name).ok_or_else(|| format!("no schedule '{}'", name))?;
				scheduler.run_now(schedule.id).await?;
			}
			Some(("enable", args)) | Some(("disable", args)) => {
				let name = args.get_one::<String>("name").expect("required");
				let schedule =
					scheduler.find_by_name(name).ok_or_else(|| format!("no schedule '{}'", name))?;
				let enabled = sub.subcommand_name() == Some("enable");
				scheduler.set_enabled(schedule.id, enabled)?;
			}
			_ => unreachable!("subcommand required"),
		},
		Some(("ls", sub)) => {
			let target = parse_endpoint(&remotes, sub.get_one::<String>("target").expect("required"))?;
			let files = backend.list(target.remote.backend_name(), &target.path).await?;
			for file in files {
				let marker = if file.is_dir { "/" } else { "" };
				println!("{:>12}  {}{}", file.size, file.name, marker);
			}
		}
		Some(("rm", sub)) => {
			let target = parse_endpoint(&remotes, sub.get_one::<String>("target").expect("required"))?;
			backend
				.delete(target.remote.backend_name(), &target.path, sub.get_flag("recursive"))
				.await?;
		}
		Some(("mv", sub)) => {
			let from = parse_endpoint(&remotes, sub.get_one::<String>("from").expect("required"))?;
			let to_path = sub.get_one::<String>("to").expect("required");
			backend.rename(from.remote.backend_name(), &from.path, to_path).await?;
		}
		Some(("mkdir", sub)) => {
			let target = parse_endpoint(&remotes, sub.get_one::<String>("target").expect("required"))?;
			backend.mkdir(target.remote.backend_name(), &target.path).await?;
		}
		Some(("daemon", _)) => {
			let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
			let loop_scheduler = scheduler.clone();
			let runner = tokio::spawn(async move { loop_scheduler.run(shutdown_rx).await });
			tokio::signal::ctrl_c().await?;
			let _ = shutdown_tx.send(true);
			let _ = runner.await;
		}
		_ => unreachable!("subcommand required"),
	}

	Ok(())
}

// vim: ts=4
