pub mod api;
pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod datetime;
pub mod http;
pub mod normalize;
pub mod render;
pub mod session;
pub mod store;
pub mod task;
pub mod views;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info,
  warn
};

use crate::api::Credential;
use crate::board::Board;
use crate::commands::CommandEnv;
use crate::config::{
  ClientConfig,
  TOKEN_ENV_VAR
};
use crate::coordinator::MutationCoordinator;
use crate::datetime::ViewClock;
use crate::http::HttpTaskApi;
use crate::normalize::Normalizer;
use crate::session::Session;
use crate::store::TaskStore;

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
    "starting taskdeck CLI"
  );

  let mut cfg = ClientConfig::load(
    cli.config.as_deref()
  )?;
  if let Some(url) = cli.api_url {
    debug!(url = %url, "api url from command line");
    cfg.api_url = url;
  }

  let token = cli.token.or_else(|| {
    std::env::var(TOKEN_ENV_VAR).ok()
  });
  let credential =
    token.and_then(Credential::new);
  if credential.is_none() {
    warn!(
      "no credential supplied; requests \
       will be refused"
    );
  }

  let tz = cfg.timezone();
  let api = HttpTaskApi::from_config(
    &cfg
  )
  .with_context(|| {
    format!(
      "failed to set up client for {}",
      cfg.api_url
    )
  })?;
  let session = Arc::new(
    Session::new(credential)
      .with_terminate_hook(|| {
        warn!(
          "credential rejected; local \
           tasks discarded"
        );
      })
  );
  let store = TaskStore::shared();
  let coordinator =
    MutationCoordinator::new(
      api,
      Arc::clone(&store),
      session,
      Normalizer::new(tz)
    );

  let mut board = Board::new(store)
    .with_recent_limit(cfg.recent_limit);
  let renderer =
    render::Renderer::new(!cli.no_color);
  let env = CommandEnv {
    board:        &mut board,
    renderer:     &renderer,
    clock:        ViewClock::now(tz),
    recent_limit: cfg.recent_limit
  };

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;
  runtime.block_on(commands::dispatch(
    &coordinator,
    env,
    cli.command
  ))?;

  info!("done");
  Ok(())
}
