pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod identity;
pub mod notify;
pub mod render;
pub mod task;
pub mod task_store;
pub mod views;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskdeck"
  );

  let mut cfg = config::Config::load(
    cli.rcfile.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );
  debug!(files = ?cfg.loaded_files, "configuration ready");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage = Arc::new(
    datastore::FileSlotStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open data store at \
         {}",
        data_dir.display()
      )
    })?
  );
  // Quiet runs keep notifications in
  // the log only.
  let notifier: Arc<dyn notify::Notifier> =
    if cli.quiet > 0 {
      Arc::new(notify::TracingNotifier)
    } else {
      Arc::new(
        render::ConsoleNotifier::new(
          &cfg
        )?
      )
    };

  let tz = datetime::resolve_timezone(
    cfg.timezone().as_deref()
  );
  let clock = datetime::DayClock::new(
    tz,
    datetime::now_millis()
  );

  let identity =
    identity::IdentityStore::load(
      storage.clone(),
      notifier.clone(),
      cfg.auth_delay()?
    );
  let tasks =
    task_store::TaskStore::load(
      storage,
      notifier
    )
    .context(
      "failed to load tasks"
    )?;

  let mut ctx = commands::AppContext {
    identity,
    tasks,
    renderer: render::Renderer::new(
      &cfg
    )?,
    clock
  };

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  runtime.block_on(commands::dispatch(
    &mut ctx,
    cli.command
  ))?;

  info!("done");
  Ok(())
}
