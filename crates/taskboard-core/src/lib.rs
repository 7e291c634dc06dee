pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod form;
pub mod render;
pub mod store;
pub mod task;
pub mod validation;
pub mod view;

use std::ffi::OsString;
use std::fs::File;
use std::io::{
  self,
  BufReader,
  IsTerminal
};

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
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskboard"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.taskboardrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let tz = datetime::resolve_timezone(
    cfg.timezone().as_deref()
  );
  info!(timezone = %tz, "resolved timezone");
  let clock =
    datetime::SystemClock::new(tz);

  let stdout = io::stdout();
  let renderer = render::Renderer::new(
    &cfg,
    stdout.is_terminal()
  )?;

  let mut session =
    commands::Session::new(
      &cfg,
      Box::new(clock),
      renderer
    )?;
  let mut out = stdout.lock();

  for line in &cli.exec {
    if session.execute(line, &mut out)?
      == commands::Flow::Quit
    {
      return Ok(());
    }
  }

  match cli.script {
    | Some(path) => {
      let file = File::open(&path)
        .with_context(|| {
          format!(
            "failed to open script {}",
            path.display()
          )
        })?;
      session
        .run(BufReader::new(file), &mut out)?;
    }
    | None => {
      let stdin = io::stdin();
      let interactive = stdin.is_terminal();
      session = session.with_prompt(interactive);
      session.run(stdin.lock(), &mut out)?;
    }
  }

  info!("done");
  Ok(())
}
